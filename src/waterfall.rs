//! Tries candidates in turn until one ad starts or the run gives up.
//!
//! Resolution and validation failures are tracked here; start and playback
//! failures are tracked by the unit that hit them. Either way the run moves
//! on to the next candidate of the chain it already holds.

use crate::chain::ResolutionChain;
use crate::config::Settings;
use crate::error::{Result, VastError};
use crate::models::Ad;
use crate::options::{Hooks, RequestOptions, UnitOptions};
use crate::resolver::Resolver;
use crate::run::{run_within, AdReadyCallback, RunOptions};
use crate::surface::SurfaceHost;
use crate::timing::Deadline;
use crate::tracking::{track_error, HttpPixelTracker, PixelTracker};
use crate::unit::AdUnit;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What an error reported by the waterfall relates to
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The candidate chain that failed
    pub chain: Option<ResolutionChain>,
    /// The unit, for errors raised after the ad started
    pub unit: Option<AdUnit>,
}

pub type UnitCallback = Arc<dyn Fn(&AdUnit) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&VastError, &ErrorContext) + Send + Sync>;
pub type RunFinishCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct WaterfallOptions {
    pub request: RequestOptions,
    pub unit: UnitOptions,
    pub hooks: Hooks,
    /// Budget in milliseconds shared by every attempt; `request.timeout`
    /// when unset
    ///
    /// `request.timeout` and `unit.timeout` also bound each resolution and
    /// each start on their own.
    pub timeout: Option<u64>,
    pub tracker: Arc<dyn PixelTracker>,

    pub on_ad_ready: Option<UnitCallback>,
    pub on_ad_start: Option<UnitCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_run_finish: Option<RunFinishCallback>,
}

impl Default for WaterfallOptions {
    fn default() -> Self {
        WaterfallOptions {
            request: RequestOptions::default(),
            unit: UnitOptions::default(),
            hooks: Hooks::default(),
            timeout: None,
            tracker: Arc::new(HttpPixelTracker::new()),
            on_ad_ready: None,
            on_ad_start: None,
            on_error: None,
            on_run_finish: None,
        }
    }
}

impl fmt::Debug for WaterfallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaterfallOptions")
            .field("request", &self.request)
            .field("unit", &self.unit)
            .field("hooks", &self.hooks)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl WaterfallOptions {
    /// Options taken from a settings file, with no callbacks attached
    pub fn from_settings(settings: &Settings) -> Self {
        WaterfallOptions {
            request: settings.request.clone(),
            unit: settings.unit.clone(),
            timeout: settings.timeout,
            ..WaterfallOptions::default()
        }
    }

    fn report(&self, error: &VastError, context: ErrorContext) {
        if let Some(on_error) = &self.on_error {
            on_error(error, &context);
        }
    }

    fn run_finished(&self) {
        if let Some(on_run_finish) = &self.on_run_finish {
            on_run_finish();
        }
    }
}

#[derive(Default)]
struct SwitchState {
    cancelled: AtomicBool,
    unit: Mutex<Option<AdUnit>>,
}

/// Cancels a waterfall run, and the unit it started if there is one
#[derive(Clone, Default)]
pub struct CancelSwitch {
    state: Arc<SwitchState>,
}

impl CancelSwitch {
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);

        let unit = self.state.unit.lock().take();
        if let Some(unit) = unit {
            if !unit.is_finished() {
                debug!("Cancelling the playing ad");
                let _ = unit.cancel();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Keep `unit` for a later cancel; hands it back if already cancelled
    fn attach(&self, unit: AdUnit) -> std::result::Result<(), AdUnit> {
        let mut slot = self.state.unit.lock();
        if self.is_cancelled() {
            return Err(unit);
        }
        *slot = Some(unit);
        Ok(())
    }
}

impl fmt::Debug for CancelSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSwitch")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A running waterfall
#[derive(Debug)]
pub struct WaterfallHandle {
    switch: CancelSwitch,
    task: JoinHandle<()>,
}

impl WaterfallHandle {
    pub fn cancel(&self) {
        self.switch.cancel();
    }

    pub fn switch(&self) -> CancelSwitch {
        self.switch.clone()
    }

    /// Wait until an ad started or the run gave up
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Waterfall task failed: {}", e);
        }
    }
}

#[derive(Clone)]
pub struct Waterfall {
    resolver: Resolver,
    host: Arc<dyn SurfaceHost>,
    options: WaterfallOptions,
}

impl Waterfall {
    pub fn new(resolver: Resolver, host: Arc<dyn SurfaceHost>, options: WaterfallOptions) -> Self {
        Waterfall { resolver, host, options }
    }

    /// Start the run for `tag` in the background
    pub fn run(&self, tag: &str) -> WaterfallHandle {
        let switch = CancelSwitch::default();
        let waterfall = self.clone();
        let tag = tag.to_string();
        let cancel = switch.clone();

        let task = tokio::spawn(async move { waterfall.drive(tag, cancel).await });
        WaterfallHandle { switch, task }
    }

    async fn drive(self, tag: String, switch: CancelSwitch) {
        let options = &self.options;
        let deadline = Deadline::from_millis(options.timeout.or(options.request.timeout));
        let run_options = self.run_options(&switch);
        let mut previous: Option<ResolutionChain> = None;

        loop {
            let resolve_by = deadline.earliest(Deadline::from_millis(options.request.timeout));
            let resolved = match &previous {
                None => Ok(self.resolver.request_ad_within(&tag, &options.request, resolve_by).await),
                Some(chain) => {
                    self.resolver
                        .request_next_ad_within(chain, &options.request, resolve_by)
                        .await
                }
            };
            if switch.is_cancelled() {
                info!("Waterfall cancelled");
                break;
            }

            let chain = match resolved {
                Ok(chain) => chain,
                Err(e) => {
                    debug!("No candidate left: {}", e);
                    break;
                }
            };

            match self.validate(&chain) {
                Err(error) => {
                    warn!("Rejected candidate: {}", error);
                    if let Some(code) = error.code() {
                        track_error(&chain, code, options.tracker.as_ref());
                    }
                    options.report(&error, ErrorContext {
                        chain: Some(chain.clone()),
                        unit: None,
                    });
                }
                Ok(playable) => {
                    let start_by = deadline.earliest(Deadline::from_millis(options.unit.timeout));
                    match run_within(&playable, self.host.as_ref(), &run_options, start_by).await {
                        Ok(unit) => {
                            self.started(unit, &switch);
                            return;
                        }
                        Err(_) if switch.is_cancelled() => {
                            info!("Waterfall cancelled while the ad was starting");
                            break;
                        }
                        Err(error) => {
                            warn!("Candidate failed to start: {}", error);
                            options.report(&error, ErrorContext {
                                chain: Some(playable),
                                unit: None,
                            });
                        }
                    }
                }
            }

            if switch.is_cancelled() || deadline.is_expired() || !chain.has_remaining_candidates(&options.request) {
                break;
            }
            previous = Some(chain);
        }

        options.run_finished();
    }

    /// Reject a candidate, or hand back the chain to play
    fn validate(&self, chain: &ResolutionChain) -> Result<ResolutionChain> {
        let head = chain
            .head()
            .ok_or_else(|| VastError::InvalidChain("empty chain".to_string()))?;
        if let Some(error) = head.error() {
            return Err(error.clone());
        }

        let executable = head.ad().is_some_and(Ad::has_executable_creative);
        if executable && !self.options.unit.vpaid_enabled {
            return Err(VastError::VpaidNotAllowed);
        }

        if let Some(validate) = &self.options.hooks.validate_chain {
            validate(chain)?;
        }

        Ok(match &self.options.hooks.transform_chain {
            Some(transform) => transform(chain.clone()),
            None => chain.clone(),
        })
    }

    /// Run options whose ready hook drops the unit if the run was cancelled
    fn run_options(&self, switch: &CancelSwitch) -> RunOptions {
        let switch = switch.clone();
        let ready = self.options.on_ad_ready.clone();
        let on_ad_ready: AdReadyCallback = Arc::new(move |unit: &AdUnit| {
            if switch.is_cancelled() {
                let _ = unit.cancel();
                return;
            }
            if let Some(ready) = &ready {
                ready(unit);
            }
        });

        RunOptions {
            unit: self.options.unit.clone(),
            hooks: self.options.hooks.clone(),
            tracker: self.options.tracker.clone(),
            on_ad_ready: Some(on_ad_ready),
        }
    }

    /// Hand the started unit over to the caller's callbacks
    fn started(&self, unit: AdUnit, switch: &CancelSwitch) {
        let options = &self.options;

        if let Err(unit) = switch.attach(unit.clone()) {
            info!("Waterfall cancelled after the ad started");
            let _ = unit.cancel();
            options.run_finished();
            return;
        }

        {
            let options = options.clone();
            let failed = unit.clone();
            unit.on_error(move |error| {
                options.report(error, ErrorContext {
                    chain: Some(failed.chain().clone()),
                    unit: Some(failed.clone()),
                });
            });
        }
        {
            let options = options.clone();
            unit.on_finish(move || options.run_finished());
        }

        if let Some(on_ad_start) = &options.on_ad_start {
            on_ad_start(&unit);
        }
    }
}

/// Run a waterfall for `tag` with an HTTP resolver
pub fn run_waterfall(tag: &str, host: Arc<dyn SurfaceHost>, options: WaterfallOptions) -> Result<WaterfallHandle> {
    Ok(Waterfall::new(Resolver::http()?, host, options).run(tag))
}
