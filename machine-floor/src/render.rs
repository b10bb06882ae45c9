//! Render port and its implementations.
//!
//! The presenter never touches a display directly. It talks to a
//! [`RenderPort`], which offers a small capability set: set text for a
//! field, toggle a section, set the status line, set the message banner,
//! and draw the grid.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use colored::Colorize;

use crate::presenter::{Field, GridCard, Indicator, Section, ViewKind, ViewState};
use crate::tracing::prelude::*;

/// Severity of the message banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Error,
}

pub trait RenderPort {
    fn set_text(&mut self, field: Field, text: &str);

    fn set_section_visible(&mut self, section: Section, visible: bool);

    fn set_status(&mut self, label: &str, indicator: Indicator);

    /// An empty message hides the banner.
    fn set_message(&mut self, message: &str, kind: MessageKind);

    fn render_grid(&mut self, cards: &[GridCard]);

    /// Called once a batch of updates is complete.
    fn flush(&mut self) {}
}

impl<T: RenderPort + ?Sized> RenderPort for Arc<Mutex<T>> {
    fn set_text(&mut self, field: Field, text: &str) {
        lock(self).set_text(field, text);
    }

    fn set_section_visible(&mut self, section: Section, visible: bool) {
        lock(self).set_section_visible(section, visible);
    }

    fn set_status(&mut self, label: &str, indicator: Indicator) {
        lock(self).set_status(label, indicator);
    }

    fn set_message(&mut self, message: &str, kind: MessageKind) {
        lock(self).set_message(message, kind);
    }

    fn render_grid(&mut self, cards: &[GridCard]) {
        lock(self).render_grid(cards);
    }

    fn flush(&mut self) {
        lock(self).flush();
    }
}

fn lock<T: ?Sized>(shared: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Push a whole view into a port.
pub fn present<P: RenderPort + ?Sized>(view: &ViewState, port: &mut P) {
    let kind = view.kind();
    port.set_section_visible(Section::Idle, kind == ViewKind::Idle);
    port.set_section_visible(Section::Running, kind == ViewKind::Running);

    for (field, text) in view.fields() {
        port.set_text(field, &text);
    }

    let status = view.status_label();
    port.set_status(status.text, status.indicator);
}

/// Re-render only the ticking duration field.
pub fn present_duration<P: RenderPort + ?Sized>(view: &ViewState, port: &mut P) {
    let (field, text) = view.duration_field();
    port.set_text(field, &text);
}

/// Show one of the top-level views (or none) and hide the others.
pub fn show_only<P: RenderPort + ?Sized>(port: &mut P, shown: Option<Section>) {
    for section in [Section::Dashboard, Section::Placeholder, Section::Grid] {
        port.set_section_visible(section, shown == Some(section));
    }
}

/// In-memory render target. Keeps the latest value of every slot.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub texts: BTreeMap<Field, String>,
    pub visible: BTreeSet<Section>,
    pub status: Option<(String, Indicator)>,
    pub message: Option<(String, MessageKind)>,
    pub grid: Vec<GridCard>,
    /// Number of completed update batches.
    pub frames: usize,
}

impl Snapshot {
    pub fn text(&self, field: Field) -> Option<&str> {
        self.texts.get(&field).map(String::as_str)
    }

    pub fn is_visible(&self, section: Section) -> bool {
        self.visible.contains(&section)
    }

    pub fn message_text(&self) -> Option<&str> {
        self.message.as_ref().map(|(m, _)| m.as_str())
    }

    /// Fields that are currently on screen, in display order.
    pub fn visible_texts(&self) -> impl Iterator<Item = (Field, &str)> {
        self.texts
            .iter()
            .filter(|(field, _)| field.section().is_none_or(|s| self.is_visible(s)))
            .map(|(field, text)| (*field, text.as_str()))
    }
}

impl RenderPort for Snapshot {
    fn set_text(&mut self, field: Field, text: &str) {
        self.texts.insert(field, text.to_string());
    }

    fn set_section_visible(&mut self, section: Section, visible: bool) {
        if visible {
            self.visible.insert(section);
        } else {
            self.visible.remove(&section);
        }
    }

    fn set_status(&mut self, label: &str, indicator: Indicator) {
        self.status = Some((label.to_string(), indicator));
    }

    fn set_message(&mut self, message: &str, kind: MessageKind) {
        self.message = (!message.is_empty()).then(|| (message.to_string(), kind));
    }

    fn render_grid(&mut self, cards: &[GridCard]) {
        self.grid = cards.to_vec();
    }

    fn flush(&mut self) {
        self.frames += 1;
    }
}

/// Writes a plain-text frame to a terminal (or any writer) on every flush.
pub struct TerminalRenderer<W> {
    frame: Snapshot,
    out: W,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            frame: Snapshot::default(),
            out,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_frame(&mut self) -> io::Result<()> {
        let frame = &self.frame;
        let out = &mut self.out;

        if let Some((message, kind)) = &frame.message {
            match kind {
                MessageKind::Info => writeln!(out, "{}", message.dimmed())?,
                MessageKind::Error => writeln!(out, "{}", message.red().bold())?,
            }
        }

        if frame.is_visible(Section::Placeholder) {
            writeln!(out, "No machine selected.")?;
        }

        if frame.is_visible(Section::Dashboard) {
            let name = frame.text(Field::MachineName).unwrap_or_default();
            writeln!(out, "{}", name.bold())?;
            if let Some((label, indicator)) = &frame.status {
                writeln!(out, "  {} {}", dot(*indicator), label)?;
            }
            for (field, text) in frame.visible_texts() {
                if matches!(field, Field::MachineName | Field::StatusText) {
                    continue;
                }
                writeln!(out, "  {:<20}{}", field.label(), text)?;
            }
        }

        if frame.is_visible(Section::Grid) {
            for card in &frame.grid {
                let label = card.status().map(|s| s.text).unwrap_or("ERROR");
                writeln!(
                    out,
                    "{} {:<24} {:<24} {}",
                    dot(card.indicator()),
                    card.title(),
                    label,
                    card.summary()
                )?;
            }
        }

        writeln!(out)?;
        out.flush()
    }
}

fn dot(indicator: Indicator) -> colored::ColoredString {
    match indicator {
        Indicator::Alert => "●".red(),
        Indicator::Normal => "●".green(),
    }
}

impl<W: Write> RenderPort for TerminalRenderer<W> {
    fn set_text(&mut self, field: Field, text: &str) {
        self.frame.set_text(field, text);
    }

    fn set_section_visible(&mut self, section: Section, visible: bool) {
        self.frame.set_section_visible(section, visible);
    }

    fn set_status(&mut self, label: &str, indicator: Indicator) {
        self.frame.set_status(label, indicator);
    }

    fn set_message(&mut self, message: &str, kind: MessageKind) {
        self.frame.set_message(message, kind);
    }

    fn render_grid(&mut self, cards: &[GridCard]) {
        self.frame.render_grid(cards);
    }

    fn flush(&mut self) {
        self.frame.flush();
        if let Err(e) = self.write_frame() {
            warn!("Failed to write frame: {e}");
        }
    }
}
