//! TapeCanvas - export a saved session
//!
//! Usage: `tapecanvas <session.json> [out-dir]`
//!
//! Restores the session into a controller with a fixed viewport and writes
//! PNG and SVG renderings of the visible window, plus a gzip backup of the
//! session document, into `out-dir`.

use anyhow::{bail, Context};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tapecanvas::controller::LogNotifier;
use tapecanvas::export::ExportedFile;
use tapecanvas::store::write_backup;
use tapecanvas::{CanvasConfig, CanvasController, ExportFormat, FileStore, ShareSink};

const VIEWPORT: (f64, f64) = (1024.0, 768.0);

/// Keeps exported files until they are written out.
#[derive(Clone, Default)]
struct Collected(Rc<RefCell<Vec<ExportedFile>>>);

impl ShareSink for Collected {
    fn share(&mut self, file: ExportedFile) {
        self.0.borrow_mut().push(file);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(session_path) = args.next().map(PathBuf::from) else {
        bail!("usage: tapecanvas <session.json> [out-dir]");
    };
    let out_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output directory {}", out_dir.display()))?;

    let collected = Collected::default();
    let mut controller = CanvasController::new(
        CanvasConfig::default(),
        Arc::new(FileStore::new(session_path.clone())),
        Box::new(LogNotifier),
        Box::new(collected.clone()),
    );
    controller.set_viewport(VIEWPORT.0, VIEWPORT.1);

    let restored = controller
        .restore()
        .with_context(|| format!("restore session {}", session_path.display()))?;
    let Some(stroke_count) = restored else {
        bail!("no session at {}", session_path.display());
    };
    log::info!("loaded {} strokes from {}", stroke_count, session_path.display());

    let now = chrono::Local::now();
    for format in [ExportFormat::Png, ExportFormat::Svg] {
        let mut options = controller.config().export.clone();
        options.format = format;
        controller.set_export_options(options);
        controller
            .export(now)
            .with_context(|| format!("export {}", format.label()))?;
    }

    for file in collected.0.borrow().iter() {
        write_file(&out_dir.join(&file.file_name), &file.bytes)?;
    }

    let document = std::fs::read(&session_path)
        .with_context(|| format!("read session {}", session_path.display()))?;
    let backup = out_dir.join("session.json.gz");
    write_backup(&backup, &document)?;
    log::info!("wrote backup {}", backup.display());

    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;
    log::info!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
