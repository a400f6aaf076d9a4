//! Monitor discovery
//!
//! Three strategies in priority order: RandR 1.5 monitors, RandR 1.2 CRTCs,
//! then the whole root window. Each returns raw viewports; deduplication
//! and the screen diff happen in the model.

use anyhow::Result;
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{ConnectionExt as _, Timestamp, Window};

use crate::shared::Geometry;
use crate::wm::display::Extensions;
use crate::wm::screen::{Output, ScannedViewport};

/// Which strategy produced a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    Monitors,
    Crtcs,
    Root,
}

/// Run the best available strategy. A strategy that fails or finds nothing
/// falls through to the next.
pub fn scan<C: Connection>(
    conn: &C,
    root: Window,
    root_geometry: Geometry,
    extensions: &Extensions,
) -> (ScanSource, Vec<ScannedViewport>) {
    if extensions.randr.is_some() && extensions.randr_monitors {
        match scan_monitors(conn, root) {
            Ok(found) if !found.is_empty() => return (ScanSource::Monitors, found),
            Ok(_) => debug!("RandR reported no monitors"),
            Err(e) => warn!("RandR monitor query failed: {}", e),
        }
    }
    if extensions.randr.is_some() {
        match scan_crtcs(conn, root) {
            Ok(found) if !found.is_empty() => return (ScanSource::Crtcs, found),
            Ok(_) => debug!("RandR reported no active CRTCs"),
            Err(e) => warn!("RandR CRTC query failed: {}", e),
        }
    }
    (ScanSource::Root, vec![ScannedViewport::new(root_geometry, Vec::new())])
}

/// Fetch output names and sizes for a list of outputs in one batch
fn outputs<C: Connection>(conn: &C, ids: &[randr::Output], timestamp: Timestamp) -> Result<Vec<Output>> {
    let cookies = ids
        .iter()
        .map(|o| conn.randr_get_output_info(*o, timestamp))
        .collect::<Result<Vec<_>, _>>()?;
    let mut found = Vec::with_capacity(cookies.len());
    for cookie in cookies {
        let info = cookie.reply()?;
        found.push(Output {
            name: String::from_utf8_lossy(&info.name).into_owned(),
            mm_width: info.mm_width,
            mm_height: info.mm_height,
        });
    }
    Ok(found)
}

fn scan_monitors<C: Connection>(conn: &C, root: Window) -> Result<Vec<ScannedViewport>> {
    let monitors = conn.randr_get_monitors(root, true)?.reply()?.monitors;
    let mut found = Vec::with_capacity(monitors.len());
    for monitor in monitors {
        let geometry = Geometry::new(
            monitor.x as i32,
            monitor.y as i32,
            monitor.width as u32,
            monitor.height as u32,
        );
        let mut named = outputs(conn, &monitor.outputs, x11rb::CURRENT_TIME)?;
        if named.is_empty() {
            // Virtual monitors have no outputs; their own name identifies them.
            let name = conn.get_atom_name(monitor.name)?.reply()?.name;
            named.push(Output {
                name: String::from_utf8_lossy(&name).into_owned(),
                mm_width: monitor.width_in_millimeters,
                mm_height: monitor.height_in_millimeters,
            });
        }
        debug!("monitor {:?} outputs {:?}", geometry, named);
        found.push(ScannedViewport::new(geometry, named));
    }
    Ok(found)
}

fn scan_crtcs<C: Connection>(conn: &C, root: Window) -> Result<Vec<ScannedViewport>> {
    let resources = conn.randr_get_screen_resources_current(root)?.reply()?;
    let timestamp = resources.config_timestamp;
    let cookies = resources
        .crtcs
        .iter()
        .map(|c| conn.randr_get_crtc_info(*c, timestamp))
        .collect::<Result<Vec<_>, _>>()?;

    let mut found = Vec::new();
    for cookie in cookies {
        let crtc = cookie.reply()?;
        if crtc.outputs.is_empty() || crtc.width == 0 || crtc.height == 0 {
            continue;
        }
        let geometry = Geometry::new(crtc.x as i32, crtc.y as i32, crtc.width as u32, crtc.height as u32);
        let named = outputs(conn, &crtc.outputs, timestamp)?;
        debug!("crtc {:?} outputs {:?}", geometry, named);
        found.push(ScannedViewport::new(geometry, named));
    }
    Ok(found)
}

/// Name of the RandR primary output, if any
pub fn primary_output<C: Connection>(conn: &C, root: Window) -> Result<Option<String>> {
    let primary = conn.randr_get_output_primary(root)?.reply()?.output;
    if primary == x11rb::NONE {
        return Ok(None);
    }
    let info = conn.randr_get_output_info(primary, x11rb::CURRENT_TIME)?.reply()?;
    Ok(Some(String::from_utf8_lossy(&info.name).into_owned()))
}
