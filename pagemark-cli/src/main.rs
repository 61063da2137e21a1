mod script;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use image::imageops::{self, FilterType};
use pagemark_core::{
    compose_page, export_file_name, Command, Config, DisplayMapping, PageId, Point, RenderImage,
    Session, SessionEvent, SourceFile,
};
use pagemark_render::RasterProvider;
use pagemark_tty::{write_status_line, DrawParams, EventMapper, KittyRenderer, UiEvent};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "pagemark",
    version,
    about = "Annotate images and PDFs with pen strokes, check marks and text stamps"
)]
struct Args {
    /// Image or PDF to annotate
    file: PathBuf,

    /// Page to start on (0-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Rendering scale applied to the source
    #[arg(long)]
    scale: Option<f32>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Apply a JSON action script, export and exit without a UI
    #[arg(long)]
    script: Option<PathBuf>,

    /// Export file name; `.jpg` is appended when missing
    #[arg(short = 'o', long = "output")]
    output: Option<String>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pagemark", "pagemark")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs, args.script.is_some())?;

    let config = load_config(&args, &project_dirs)?;
    let mut session = Session::new(&config);
    let provider = RasterProvider::new(config.pdfium_library.clone());

    let bytes = fs::read(&args.file).with_context(|| format!("failed to read {:?}", args.file))?;
    let source = SourceFile::from_path_bytes(&args.file, bytes);
    session
        .load_with(&provider, source)
        .await
        .with_context(|| format!("failed to open {:?}", args.file))?;

    if let Some(page) = args.page {
        session.apply(Command::GotoPage { page })?;
    }

    match &args.script {
        Some(path) => run_batch(&mut session, &config, path, args.output.as_deref()),
        None => run_interactive(&mut session, &config, &args.file),
    }
}

fn load_config(args: &Args, project_dirs: &ProjectDirs) -> Result<Config> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let mut config = Config::load(&path).with_context(|| format!("invalid config {:?}", path))?;
    if let Some(scale) = args.scale {
        config.working_scale = scale;
        config.validate()?;
    }
    Ok(config)
}

fn run_batch(
    session: &mut Session,
    config: &Config,
    script_path: &Path,
    output: Option<&str>,
) -> Result<()> {
    let actions = script::load_script(script_path)?;
    script::run_script(session, &actions)?;

    let file_name = export_file_name(output.unwrap_or_default(), &config.default_export_name);
    if !save_export(session, &file_name)? {
        return Err(anyhow!("nothing to export"));
    }
    println!("{file_name}");
    Ok(())
}

/// Writes the composite JPEG; `false` when no document is loaded.
fn save_export(session: &Session, file_name: &str) -> Result<bool> {
    let Some(bytes) = session.export_jpeg()? else {
        return Ok(false);
    };
    fs::write(file_name, &bytes).with_context(|| format!("failed to write {file_name}"))?;
    info!(file = file_name, bytes = bytes.len(), "exported composite");
    Ok(true)
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

/// Where the current page was last drawn, for mapping mouse cells back to
/// raster coordinates.
#[derive(Debug, Default)]
struct PageView {
    page: Option<PageId>,
    mapping: Option<DisplayMapping>,
}

impl PageView {
    fn update(&mut self, page: PageId, params: DrawParams, raster_width: u32, raster_height: u32) {
        self.page = Some(page);
        self.mapping = Some(DisplayMapping::new(
            params.columns as f32,
            params.rows as f32,
            raster_width,
            raster_height,
        ));
    }

    fn clear(&mut self) {
        self.page = None;
        self.mapping = None;
    }

    /// Maps a cell to its page and raster point, if it lies on the page.
    fn locate(&self, column: u16, row: u16) -> Option<(PageId, Point)> {
        let page = self.page?;
        let display = Point::new(f32::from(column) + 0.5, f32::from(row) + 0.5);
        let raster = self.mapping?.to_raster_within(display)?;
        Some((page, raster))
    }
}

fn run_interactive(session: &mut Session, config: &Config, file: &Path) -> Result<()> {
    let title = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    let mut event_mapper = EventMapper::new();
    let mut view = PageView::default();
    let mut notice: Option<String> = None;
    let events = session.events();
    let mut dirty = true;

    loop {
        if dirty {
            let status = status_line(session, &title, &event_mapper, notice.as_deref());
            redraw(&mut renderer, session, &mut view, &status)?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            let ev = event::read()?;
            if matches!(ev, Event::Resize(..)) {
                dirty = true;
                continue;
            }
            let ui_event = event_mapper.map_event(ev);
            match handle_event(ui_event, session, config, &view, &mut notice) {
                Ok(LoopAction::ContinueRedraw) => dirty = true,
                Ok(LoopAction::Continue) => {}
                Ok(LoopAction::Quit) => break,
                Err(err) => {
                    warn!(error = %err, "command failed");
                    notice = Some(format!("error: {err:#}"));
                    dirty = true;
                }
            }
        }

        for event in events.lock().drain(..) {
            match event {
                SessionEvent::LoadFailed { reason } => {
                    notice = Some(format!("load failed: {reason}"));
                }
                SessionEvent::SnapshotLost { reason, .. } => {
                    notice = Some(format!("undo lost annotations: {reason}"));
                }
                _ => {}
            }
            dirty = true;
        }
    }

    let mut writer = renderer.writer();
    crossterm::execute!(&mut writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    Ok(())
}

fn handle_event(
    event: UiEvent,
    session: &mut Session,
    config: &Config,
    view: &PageView,
    notice: &mut Option<String>,
) -> Result<LoopAction> {
    match event {
        UiEvent::Command(cmd) => {
            *notice = None;
            if let Command::SelectQuickStamp { index } = cmd {
                if index >= session.quick_stamps().len() {
                    *notice = Some(format!("no quick stamp #{}", index.saturating_add(1)));
                    return Ok(LoopAction::ContinueRedraw);
                }
            }
            session.apply(cmd)?;
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::PointerPress { column, row } => {
            if let Some((page, point)) = view.locate(column, row) {
                session.pointer_down(page, point);
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::PointerDrag { column, row } => {
            match (view.locate(column, row), view.page) {
                (Some((page, point)), _) => session.pointer_move(page, point),
                (None, Some(page)) => session.pointer_leave(page)?,
                (None, None) => {}
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::PointerRelease { column, row } => {
            if let Some(page) = view.page {
                session.pointer_up(page)?;
                if let Some((page, point)) = view.locate(column, row) {
                    session.pointer_click(page, point)?;
                }
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::BeginInput(_) | UiEvent::InputChanged { .. } | UiEvent::InputCancel => {
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::TextSubmit { text } => {
            if text.trim().is_empty() {
                *notice = Some("stamp text is empty".to_owned());
            } else {
                session.apply(Command::SubmitCustomText { text })?;
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::ExportSubmit { name } => {
            let file_name = export_file_name(&name, &config.default_export_name);
            *notice = Some(if save_export(session, &file_name)? {
                format!("saved {file_name}")
            } else {
                "nothing to export".to_owned()
            });
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Quit => Ok(LoopAction::Quit),
        UiEvent::None => Ok(LoopAction::Continue),
    }
}

fn status_line(
    session: &Session,
    title: &str,
    mapper: &EventMapper,
    notice: Option<&str>,
) -> String {
    let mut parts = vec![title.to_owned()];
    match session.current_page() {
        Some(page) => {
            parts.push(format!(
                "page {}/{}",
                session.state().current_page + 1,
                session.document().len()
            ));
            parts.push(session.tool().to_string());
            parts.push(format!(
                "history {}",
                session.document().history_len(page.id)
            ));
        }
        None => parts.push("no document, q to quit".to_owned()),
    }
    if let Some(notice) = notice {
        parts.push(notice.to_owned());
    }
    if let Some(pending) = mapper.pending_input() {
        parts.push(pending);
    }
    parts.join(" | ")
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &Session,
    view: &mut PageView,
    status: &str,
) -> Result<()> {
    let window = terminal::window_size()?;
    let total_cols = u32::from(window.columns).max(1);
    let total_rows = u32::from(window.rows).max(1);
    let image_rows_available = total_rows.saturating_sub(1).max(1);
    let cell_width = f32::from(window.width) / total_cols as f32;
    let cell_height = f32::from(window.height) / total_rows as f32;

    renderer.begin_sync_update()?;
    renderer.clear_all()?;

    match session.current_page().filter(|_| session.is_ready()) {
        Some(page) => {
            let params = DrawParams::fit(
                page.width(),
                page.height(),
                total_cols,
                image_rows_available,
                cell_width,
                cell_height,
            );
            let composed = preview(compose_page(page), params, cell_width, cell_height);
            renderer.draw(&RenderImage::from_rgba(composed), params)?;
            view.update(page.id, params, page.width(), page.height());
        }
        None => {
            renderer.delete_image()?;
            view.clear();
        }
    }

    draw_status_line(renderer, total_rows, status)?;
    renderer.end_sync_update()?;
    Ok(())
}

/// Downscales the page to the pixel box it will occupy, keeping transfers small.
fn preview(
    composed: image::RgbaImage,
    params: DrawParams,
    cell_width: f32,
    cell_height: f32,
) -> image::RgbaImage {
    if !(cell_width > 0.0 && cell_height > 0.0) {
        return composed;
    }
    let target_width = (params.columns as f32 * cell_width).round().max(1.0) as u32;
    let target_height = (params.rows as f32 * cell_height).round().max(1.0) as u32;
    if target_width >= composed.width() && target_height >= composed.height() {
        return composed;
    }
    imageops::resize(&composed, target_width, target_height, FilterType::Triangle)
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    total_rows: u32,
    status: &str,
) -> Result<()> {
    let status_row = u16::try_from(total_rows.saturating_sub(1)).unwrap_or(u16::MAX);
    let mut writer = renderer.writer();
    crossterm::execute!(
        &mut writer,
        cursor::MoveTo(0, status_row),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(&mut writer, status)?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs, console: bool) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pagemark.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // The terminal belongs to the page image outside batch mode.
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_map_to_raster_points_on_the_drawn_page() {
        let mut view = PageView::default();
        let page = PageId::new_v4();
        view.update(page, DrawParams::clamped(10, 5), 100, 50);

        let (hit, point) = view.locate(0, 0).unwrap();
        assert_eq!(hit, page);
        assert_eq!(point, Point::new(5.0, 5.0));
        assert_eq!(view.locate(9, 4).unwrap().1, Point::new(95.0, 45.0));
        assert!(view.locate(10, 0).is_none());
        assert!(view.locate(0, 5).is_none());

        view.clear();
        assert!(view.locate(0, 0).is_none());
    }

    #[test]
    fn preview_only_shrinks() {
        let page = image::RgbaImage::new(400, 200);
        let shrunk = preview(page.clone(), DrawParams::clamped(10, 5), 8.0, 16.0);
        assert_eq!(shrunk.dimensions(), (80, 80));

        let kept = preview(page, DrawParams::clamped(100, 50), 8.0, 16.0);
        assert_eq!(kept.dimensions(), (400, 200));
    }

    #[test]
    fn args_accept_batch_flags() {
        let args = Args::try_parse_from([
            "pagemark",
            "scan.pdf",
            "--script",
            "steps.json",
            "-o",
            "signed",
            "--scale",
            "1.5",
        ])
        .unwrap();
        assert_eq!(args.file, PathBuf::from("scan.pdf"));
        assert_eq!(args.script, Some(PathBuf::from("steps.json")));
        assert_eq!(args.output.as_deref(), Some("signed"));
        assert_eq!(args.scale, Some(1.5));
    }
}
