use image::ImageFormat;
use std::io::Cursor;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use super::session::{CaptureSession, TargetRegion};
use crate::{Result, XshotError};

const VISIBILITY_POLL: Duration = Duration::from_millis(250);

/// A decoded-and-verified PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Screenshots exactly the region's bounds.
///
/// The region must be laid out (non-zero height) before `budget` runs out,
/// otherwise this fails with [`XshotError::CaptureTimeout`]. Renderer failures
/// surface as [`XshotError::CaptureIo`].
pub async fn capture_region<S: CaptureSession + ?Sized>(
    session: &mut S,
    region: &TargetRegion,
    budget: Duration,
) -> Result<CapturedImage> {
    let png = timeout(budget, async {
        wait_until_visible(session, region).await;
        session.scroll_into_view(region).await.map_err(into_capture_io)?;
        session.screenshot_region(region).await.map_err(into_capture_io)
    })
    .await
    .map_err(|_| XshotError::CaptureTimeout(budget))??;

    let image = verify_png(png)?;
    info!(
        width = image.width,
        height = image.height,
        bytes = image.png.len(),
        "region captured"
    );
    Ok(image)
}

async fn wait_until_visible<S: CaptureSession + ?Sized>(session: &mut S, region: &TargetRegion) {
    loop {
        match session.region_height(region).await {
            Ok(Some(h)) if h > 0.0 => return,
            Ok(_) => debug!("region not laid out yet"),
            Err(err) => debug!(error = %err, "region not resolvable yet"),
        }
        sleep(VISIBILITY_POLL).await;
    }
}

fn into_capture_io(err: XshotError) -> XshotError {
    match err {
        XshotError::CaptureIo(_) | XshotError::CaptureTimeout(_) => err,
        other => XshotError::CaptureIo(other.to_string()),
    }
}

/// Checks that `png` decodes as a PNG and reads its pixel size.
pub fn verify_png(png: Vec<u8>) -> Result<CapturedImage> {
    let (width, height) = image::io::Reader::with_format(Cursor::new(&png), ImageFormat::Png)
        .into_dimensions()
        .map_err(|e| XshotError::CaptureIo(format!("screenshot is not a valid PNG: {e}")))?;
    if width == 0 || height == 0 {
        return Err(XshotError::CaptureIo("screenshot is empty".to_string()));
    }
    Ok(CapturedImage { png, width, height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn tiny_png(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgba([243, 245, 247, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn verify_png_reads_dimensions() {
        let image = verify_png(tiny_png(12, 7)).unwrap();
        assert_eq!((image.width, image.height), (12, 7));
    }

    #[test]
    fn verify_png_rejects_garbage() {
        let err = verify_png(b"definitely not a png".to_vec()).unwrap_err();
        assert!(matches!(err, XshotError::CaptureIo(_)), "got {err:?}");
    }

    #[test]
    fn non_capture_errors_become_capture_io() {
        let err = into_capture_io(XshotError::Browser("node detached".to_string()));
        match err {
            XshotError::CaptureIo(msg) => assert!(msg.contains("node detached")),
            other => panic!("expected CaptureIo, got {other:?}"),
        }
        assert!(matches!(
            into_capture_io(XshotError::CaptureTimeout(Duration::from_secs(1))),
            XshotError::CaptureTimeout(_)
        ));
    }
}
