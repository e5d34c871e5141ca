//! Industry icons (AdChoices and similar) drawn over the ad.

use crate::chain::ResolutionChain;
use crate::models::{Ad, Icon, IconResource};
use crate::surface::{PlaybackSurface, Size};
use crate::timing::parse_clock;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HorizontalPosition {
    Left,
    Right,
    Pixels(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerticalPosition {
    Top,
    Bottom,
    Pixels(f64),
}

/// An icon ready to be laid out
#[derive(Debug, Clone, PartialEq)]
pub struct IconDefinition {
    pub program: Option<String>,
    pub width: f64,
    pub height: f64,
    pub x: HorizontalPosition,
    pub y: VerticalPosition,
    /// Seconds into the ad before the icon shows
    pub offset: Option<f64>,
    /// Seconds the icon stays once shown
    pub duration: Option<f64>,
    pub px_ratio: f64,
    pub resource: IconResource,
    pub click_through: Option<String>,
    pub click_tracking: Vec<String>,
    pub view_tracking: Vec<String>,
}

impl IconDefinition {
    fn from_icon(icon: &Icon) -> Option<Self> {
        let resource = icon.resource.clone()?;

        let x = match icon.x_position.as_deref().map(str::trim) {
            Some("right") => HorizontalPosition::Right,
            Some(value) => value
                .parse()
                .map(HorizontalPosition::Pixels)
                .unwrap_or(HorizontalPosition::Left),
            None => HorizontalPosition::Left,
        };
        let y = match icon.y_position.as_deref().map(str::trim) {
            Some("bottom") => VerticalPosition::Bottom,
            Some(value) => value
                .parse()
                .map(VerticalPosition::Pixels)
                .unwrap_or(VerticalPosition::Top),
            None => VerticalPosition::Top,
        };

        Some(IconDefinition {
            program: icon.program.clone(),
            width: icon.width.unwrap_or(0.0),
            height: icon.height.unwrap_or(0.0),
            x,
            y,
            offset: icon.offset.as_deref().and_then(parse_clock),
            duration: icon.duration.as_deref().and_then(parse_clock),
            px_ratio: icon.px_ratio.unwrap_or(1.0),
            resource,
            click_through: icon.click_through.clone(),
            click_tracking: icon.click_tracking.clone(),
            view_tracking: icon.view_tracking.clone(),
        })
    }

    /// Whether the icon is due at `time` seconds
    pub fn is_visible_at(&self, time: f64) -> bool {
        let start = self.offset.unwrap_or(0.0);
        let end = self.duration.map_or(f64::INFINITY, |duration| start + duration);
        start <= time && time <= end
    }
}

/// Pixel box of a drawn icon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconPlacement {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl IconPlacement {
    fn overlaps(&self, other: &IconPlacement) -> bool {
        self.left < other.left + other.width
            && other.left < self.left + self.width
            && self.top < other.top + other.height
            && other.top < self.top + self.height
    }

    fn fits(&self, size: Size) -> bool {
        self.left >= 0.0
            && self.top >= 0.0
            && self.left + self.width <= size.width
            && self.top + self.height <= size.height
    }
}

/// One icon per program, from every ad of the chain
///
/// Icons are deduplicated by resource; within a program the icon whose
/// pixel ratio is closest to the device's wins. Icons without a program
/// stand alone.
pub fn retrieve_icons(chain: &ResolutionChain, pixel_ratio: f64) -> Vec<IconDefinition> {
    let mut seen = HashSet::new();
    let mut groups: Vec<Vec<IconDefinition>> = Vec::new();
    let mut by_program: HashMap<String, usize> = HashMap::new();

    let icons = chain
        .ads()
        .flat_map(Ad::linears)
        .flat_map(|linear| linear.icons.iter())
        .filter_map(IconDefinition::from_icon);

    for icon in icons {
        if !seen.insert(icon.resource.key().to_string()) {
            continue;
        }
        match icon.program.clone() {
            Some(program) => match by_program.get(&program) {
                Some(&group) => groups[group].push(icon),
                None => {
                    by_program.insert(program, groups.len());
                    groups.push(vec![icon]);
                }
            },
            None => groups.push(vec![icon]),
        }
    }

    groups
        .into_iter()
        .filter_map(|group| {
            group.into_iter().min_by(|a, b| {
                (a.px_ratio - pixel_ratio)
                    .abs()
                    .total_cmp(&(b.px_ratio - pixel_ratio).abs())
            })
        })
        .collect()
}

/// Place the icons due at `time`; icons that would leave the surface or
/// overlap an earlier one are left out
pub fn layout_icons(icons: &[IconDefinition], size: Size, time: f64) -> Vec<(usize, IconPlacement)> {
    let mut placed: Vec<(usize, IconPlacement)> = Vec::new();
    let mut left_stack = 0.0;
    let mut right_stack = 0.0;

    for (index, icon) in icons.iter().enumerate() {
        if icon.width <= 0.0 || icon.height <= 0.0 || !icon.is_visible_at(time) {
            continue;
        }

        let left = match icon.x {
            HorizontalPosition::Left => left_stack,
            HorizontalPosition::Right => size.width - right_stack - icon.width,
            HorizontalPosition::Pixels(left) => left,
        };
        let top = match icon.y {
            VerticalPosition::Top => 0.0,
            VerticalPosition::Bottom => size.height - icon.height,
            VerticalPosition::Pixels(top) => top,
        };
        let placement = IconPlacement {
            left,
            top,
            width: icon.width,
            height: icon.height,
        };

        if !placement.fits(size) || placed.iter().any(|(_, other)| other.overlaps(&placement)) {
            continue;
        }

        match icon.x {
            HorizontalPosition::Left => left_stack += icon.width + 1.0,
            HorizontalPosition::Right => right_stack += icon.width + 1.0,
            HorizontalPosition::Pixels(_) => (),
        }
        placed.push((index, placement));
    }

    placed
}

/// Icons of one ad unit and what is currently drawn
#[derive(Debug, Default)]
pub struct IconSet {
    icons: Vec<IconDefinition>,
    drawn: HashMap<usize, IconPlacement>,
    viewed: HashSet<usize>,
}

impl IconSet {
    pub fn new(icons: Vec<IconDefinition>) -> Self {
        IconSet {
            icons,
            ..IconSet::default()
        }
    }

    pub fn get(&self, index: usize) -> Option<&IconDefinition> {
        self.icons.get(index)
    }

    pub fn placements(&self) -> Vec<(usize, IconPlacement)> {
        let mut placements: Vec<_> = self.drawn.iter().map(|(i, p)| (*i, *p)).collect();
        placements.sort_by_key(|(index, _)| *index);
        placements
    }

    /// Bring the surface in line with the layout at `time`
    ///
    /// Returns the icons shown for the first time.
    pub fn redraw(&mut self, surface: &dyn PlaybackSurface, size: Size, time: f64) -> Vec<usize> {
        let layout: HashMap<usize, IconPlacement> = layout_icons(&self.icons, size, time).into_iter().collect();

        let stale: Vec<usize> = self
            .drawn
            .keys()
            .filter(|index| !layout.contains_key(index))
            .copied()
            .collect();
        for index in stale {
            surface.remove_icon(index);
            self.drawn.remove(&index);
        }

        let mut first_views = Vec::new();
        let mut indexes: Vec<usize> = layout.keys().copied().collect();
        indexes.sort_unstable();

        for index in indexes {
            let placement = layout[&index];
            if self.drawn.get(&index) == Some(&placement) {
                continue;
            }
            surface.render_icon(index, &self.icons[index], placement);
            self.drawn.insert(index, placement);
            if self.viewed.insert(index) {
                first_views.push(index);
            }
        }

        first_views
    }

    pub fn clear(&mut self, surface: &dyn PlaybackSurface) {
        for index in self.drawn.keys() {
            surface.remove_icon(*index);
        }
        self.drawn.clear();
    }
}
