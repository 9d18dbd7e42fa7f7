//! Presentation overrides injected once the post page has loaded.

use crate::Theme;

pub fn page_background(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "#f3f5f7",
        Theme::Dark => "#0f1115",
    }
}

/// Stylesheet that hides site chrome around the post and pads the post so
/// the capture gets a clean margin.
pub fn override_stylesheet(theme: Theme) -> String {
    let background = page_background(theme);
    format!(
        r#"
html, body {{
  background: {background} !important;
  scrollbar-width: none !important;
}}
header[role="banner"],
[data-testid="sidebarColumn"],
[data-testid="BottomBar"],
[data-testid="bottomBar"],
[data-testid="TopNavBar"],
[data-testid="xMigrationBottomBar"],
[data-testid="sheetDialog"],
[aria-live="polite"][role="status"],
div[role="progressbar"] {{
  display: none !important;
}}
main[role="main"] {{
  align-items: center !important;
}}
[data-testid="primaryColumn"] {{
  border: none !important;
  max-width: 860px !important;
  width: 860px !important;
}}
article[data-testid="tweet"][data-xshot-target] {{
  padding: 28px !important;
  border-radius: 20px !important;
}}
"#
    )
}
