use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind},
    terminal::{Clear, ClearType},
};
use pagemark_core::{Command, RenderImage};
use png::{BitDepth, ColorType, Encoder};
use tracing::trace;

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    /// Largest cell box inside `max_columns` x `max_rows` that keeps the
    /// image's aspect ratio, given the pixel size of one cell.
    pub fn fit(
        image_width: u32,
        image_height: u32,
        max_columns: u32,
        max_rows: u32,
        cell_width: f32,
        cell_height: f32,
    ) -> Self {
        if image_width == 0
            || image_height == 0
            || !(cell_width > 0.0 && cell_height > 0.0)
        {
            return Self::clamped(max_columns, max_rows);
        }
        let box_width = max_columns.max(1) as f32 * cell_width;
        let box_height = max_rows.max(1) as f32 * cell_height;
        let scale = (box_width / image_width as f32).min(box_height / image_height as f32);
        let columns = (image_width as f32 * scale / cell_width).round() as u32;
        let rows = (image_height as f32 * scale / cell_height).round() as u32;
        Self::clamped(columns.min(max_columns), rows.min(max_rows))
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` as PNG and places it at the cursor across `params` cells.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let payload = BASE64.encode(encode_png(image)?);
        let header = format!(
            "a=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1",
            self.image_id, self.placement_id, params.columns, params.rows, image.width, image.height
        );
        trace!(bytes = payload.len(), ?params, "kitty transmit");

        let chunks: Vec<&[u8]> = payload.as_bytes().chunks(KITTY_CHUNK).collect();
        let last = chunks.len().saturating_sub(1);
        for (index, chunk) in chunks.iter().enumerate() {
            let more = u8::from(index < last);
            if index == 0 {
                write!(self.writer, "\u{1b}_G{header},m={more}")?;
            } else {
                write!(self.writer, "\u{1b}_Gm={more},q=2")?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Brackets a frame so the page and status line appear together.
    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(&mut self.writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
        Ok(())
    }
}

/// Base64 bytes per kitty graphics escape.
const KITTY_CHUNK: usize = 4096;

fn encode_png(image: &RenderImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.pixels)?;
    writer.finish()?;
    Ok(buffer)
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    PointerPress { column: u16, row: u16 },
    PointerDrag { column: u16, row: u16 },
    PointerRelease { column: u16, row: u16 },
    BeginInput(InputMode),
    InputChanged { text: String },
    InputCancel,
    TextSubmit { text: String },
    ExportSubmit { name: String },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// Typing the text for a custom stamp.
    StampText,
    /// Typing the export file name.
    ExportName,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    input_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.input_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::StampText | InputMode::ExportName => self.map_event_input(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                    if let Some(digit) = c.to_digit(10) {
                        self.push_digit(digit as usize);
                    }
                    UiEvent::None
                }
                (KeyCode::Char('z'), modifiers)
                    if modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER) =>
                {
                    self.reset_count();
                    UiEvent::Command(Command::Undo)
                }
                (KeyCode::Char('u'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::Command(Command::Undo)
                }
                (KeyCode::Char('p'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::Command(Command::SelectPen)
                }
                (KeyCode::Char('c'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::Command(Command::SelectCheckMark)
                }
                (KeyCode::Char('n'), KeyModifiers::NONE) => {
                    let index = self.take_count() - 1;
                    UiEvent::Command(Command::SelectQuickStamp { index })
                }
                (KeyCode::Char('t'), KeyModifiers::NONE) => {
                    self.set_mode(InputMode::StampText);
                    UiEvent::BeginInput(InputMode::StampText)
                }
                (KeyCode::Char('s'), KeyModifiers::NONE) => {
                    self.set_mode(InputMode::ExportName);
                    UiEvent::BeginInput(InputMode::ExportName)
                }
                (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::NextPage { count })
                }
                (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::PrevPage { count })
                }
                (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                    self.reset_count();
                    UiEvent::Command(Command::GotoPage { page: 0 })
                }
                (KeyCode::Char('G'), KeyModifiers::SHIFT) | (KeyCode::End, _) => {
                    self.reset_count();
                    UiEvent::Command(Command::GotoPage { page: usize::MAX })
                }
                (KeyCode::Char('r'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::Command(Command::Reset)
                }
                (KeyCode::Char('q'), _) => {
                    self.reset_count();
                    UiEvent::Quit
                }
                _ => {
                    self.reset_count();
                    UiEvent::None
                }
            },
            _ => UiEvent::None,
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let MouseEvent {
            kind, column, row, ..
        } = mouse;
        trace!(?kind, column, row, "mouse");
        match kind {
            MouseEventKind::Down(MouseButton::Left) => UiEvent::PointerPress { column, row },
            MouseEventKind::Drag(MouseButton::Left) => UiEvent::PointerDrag { column, row },
            MouseEventKind::Up(MouseButton::Left) => UiEvent::PointerRelease { column, row },
            _ => UiEvent::None,
        }
    }

    fn map_event_input(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => {
                    self.set_mode(InputMode::Normal);
                    UiEvent::InputCancel
                }
                (KeyCode::Enter, _) => {
                    let text = self.input_buffer.clone();
                    let mode = self.mode;
                    self.set_mode(InputMode::Normal);
                    match mode {
                        InputMode::ExportName => UiEvent::ExportSubmit { name: text },
                        _ => UiEvent::TextSubmit { text },
                    }
                }
                (KeyCode::Backspace, _) => {
                    self.input_buffer.pop();
                    UiEvent::InputChanged {
                        text: self.input_buffer.clone(),
                    }
                }
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    self.input_buffer.push(c);
                    UiEvent::InputChanged {
                        text: self.input_buffer.clone(),
                    }
                }
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::StampText => Some(format!("text: {}", self.input_buffer)),
            InputMode::ExportName => Some(format!("save as: {}", self.input_buffer)),
            InputMode::Normal if !self.pending_digits.is_empty() => {
                Some(self.pending_digits.clone())
            }
            InputMode::Normal => None,
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };

        renderer.draw(&image, DrawParams::clamped(10, 5)).unwrap();
        let output = renderer.writer;
        assert_eq!(output[0], 0x1b);
        assert_eq!(output[1], b'_');
        assert_eq!(output[2], b'G');
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("c=10,r=5,s=1,v=1"));
    }

    #[test]
    fn large_images_are_split_into_continued_chunks() {
        let mut seed = 0x2545_f491_u32;
        let pixels = (0..64 * 64 * 4)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 24) as u8
            })
            .collect();
        let image = RenderImage {
            width: 64,
            height: 64,
            pixels,
        };
        let mut renderer = KittyRenderer::new(Vec::new());
        renderer.draw(&image, DrawParams::clamped(8, 4)).unwrap();

        let text = String::from_utf8(renderer.writer).unwrap();
        let escapes: Vec<&str> = text.split_terminator("\u{1b}\\").collect();
        assert!(escapes.len() > 1);
        assert!(escapes[0].contains("a=T") && escapes[0].contains("m=1;"));
        assert!(escapes[1..escapes.len() - 1]
            .iter()
            .all(|escape| escape.starts_with("\u{1b}_Gm=1,q=2;")));
        assert!(escapes[escapes.len() - 1].starts_with("\u{1b}_Gm=0,q=2;"));
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        // 10x20 pixel cells: a square image in an 80x24 box is limited by rows.
        let params = DrawParams::fit(1000, 1000, 80, 24, 10.0, 20.0);
        assert_eq!(params, DrawParams { columns: 48, rows: 24 });

        let wide = DrawParams::fit(1600, 200, 80, 24, 10.0, 20.0);
        assert_eq!(wide.columns, 80);
        assert_eq!(wide.rows, 5);

        assert_eq!(DrawParams::fit(0, 10, 7, 3, 10.0, 20.0), DrawParams::clamped(7, 3));
    }

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn mouse_event(kind: MouseEventKind, column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn ctrl_z_and_u_undo() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('z'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Command(Command::Undo)
        ));
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('z'),
                KeyModifiers::SUPER
            )),
            UiEvent::Command(Command::Undo)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('u'))),
            UiEvent::Command(Command::Undo)
        ));
    }

    #[test]
    fn tool_keys_select_tools() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('c'))),
            UiEvent::Command(Command::SelectCheckMark)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('p'))),
            UiEvent::Command(Command::SelectPen)
        ));
    }

    #[test]
    fn numeric_prefix_picks_quick_stamp() {
        let mut mapper = EventMapper::new();
        match mapper.map_event(key_event(KeyCode::Char('n'))) {
            UiEvent::Command(Command::SelectQuickStamp { index }) => assert_eq!(index, 0),
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('3'))),
            UiEvent::None
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some("3"));
        match mapper.map_event(key_event(KeyCode::Char('n'))) {
            UiEvent::Command(Command::SelectQuickStamp { index }) => assert_eq!(index, 2),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn numeric_prefix_counts_pages() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('1')));
        mapper.map_event(key_event(KeyCode::Char('2')));
        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::NextPage { count }) => assert_eq!(count, 12),
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::Char('k'))) {
            UiEvent::Command(Command::PrevPage { count }) => assert_eq!(count, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn left_button_maps_to_pointer_events() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(mouse_event(MouseEventKind::Down(MouseButton::Left), 4, 7)),
            UiEvent::PointerPress { column: 4, row: 7 }
        ));
        assert!(matches!(
            mapper.map_event(mouse_event(MouseEventKind::Drag(MouseButton::Left), 5, 7)),
            UiEvent::PointerDrag { column: 5, row: 7 }
        ));
        assert!(matches!(
            mapper.map_event(mouse_event(MouseEventKind::Up(MouseButton::Left), 6, 8)),
            UiEvent::PointerRelease { column: 6, row: 8 }
        ));
        assert!(matches!(
            mapper.map_event(mouse_event(MouseEventKind::Down(MouseButton::Right), 1, 1)),
            UiEvent::None
        ));
    }

    #[test]
    fn stamp_text_entry_collects_input() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('t'))),
            UiEvent::BeginInput(InputMode::StampText)
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some("text: "));

        mapper.map_event(key_event_with_modifiers(KeyCode::Char('O'), KeyModifiers::SHIFT));
        mapper.map_event(key_event(KeyCode::Char('x')));
        match mapper.map_event(key_event(KeyCode::Backspace)) {
            UiEvent::InputChanged { ref text } => assert_eq!(text, "O"),
            other => panic!("unexpected event: {:?}", other),
        }
        mapper.map_event(key_event(KeyCode::Char('K')));

        // Mouse input is ignored while typing.
        assert!(matches!(
            mapper.map_event(mouse_event(MouseEventKind::Down(MouseButton::Left), 0, 0)),
            UiEvent::None
        ));

        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::TextSubmit { ref text } => assert_eq!(text, "OK"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn export_prompt_submits_name_or_cancels() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('s'))),
            UiEvent::BeginInput(InputMode::ExportName)
        ));
        mapper.map_event(key_event(KeyCode::Char('a')));
        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::ExportSubmit { ref name } => assert_eq!(name, "a"),
            other => panic!("unexpected event: {:?}", other),
        }

        mapper.map_event(key_event(KeyCode::Char('s')));
        mapper.map_event(key_event(KeyCode::Char('b')));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::InputCancel
        ));
        assert_eq!(mapper.mode(), InputMode::Normal);

        // A fresh prompt starts empty.
        mapper.map_event(key_event(KeyCode::Char('s')));
        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::ExportSubmit { ref name } => assert!(name.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
