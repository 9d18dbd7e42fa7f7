use serde::{Deserialize, Serialize};

/// Extra room left below the post so shadows and rounded corners are not clipped.
pub const VIEWPORT_PADDING: u32 = 240;
/// Smallest viewport height the adapter will shrink to.
pub const MIN_ADAPTED_HEIGHT: u32 = 1600;
/// Upper bound that keeps abusive posts from allocating enormous surfaces.
pub const MAX_ADAPTED_HEIGHT: u32 = 14000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 2400,
        }
    }
}

impl Viewport {
    /// Same width, height fitted to a settled region of `observed` pixels.
    pub fn adapted_to(self, observed: u32) -> Self {
        Self {
            width: self.width,
            height: adapted_height(observed),
        }
    }
}

/// `clamp(observed + padding, MIN_ADAPTED_HEIGHT, MAX_ADAPTED_HEIGHT)`.
pub fn adapted_height(observed: u32) -> u32 {
    observed
        .saturating_add(VIEWPORT_PADDING)
        .clamp(MIN_ADAPTED_HEIGHT, MAX_ADAPTED_HEIGHT)
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
