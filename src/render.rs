//! Terminal front-ends for the event stream: progress bars or JSON lines.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::Write;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::Result;
use crate::event::{ItemEnd, LineStatus, ProgressEvent};
use crate::parser::LineCategory;

pub trait Render: Send {
    fn render(&mut self, event: &ProgressEvent) -> Result<()>;
}

/// Feeds every event to `renderer` until `End` arrives or the sender goes away.
pub async fn drain<R: Render>(
    mut events: UnboundedReceiver<ProgressEvent>,
    mut renderer: R,
) -> Result<()> {
    while let Some(event) = events.recv().await {
        renderer.render(&event)?;
        if matches!(event, ProgressEvent::End { .. }) {
            break;
        }
    }
    Ok(())
}

/// One serialized event per line.
pub struct JsonRenderer<W> {
    out: W,
}

impl<W: Write + Send> JsonRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> Render for JsonRenderer<W> {
    fn render(&mut self, event: &ProgressEvent) -> Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

fn timed_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// One bar per item. Items with a known duration get a bar measured in
/// milliseconds of media, the rest a spinner.
pub struct BarRenderer {
    bar: Option<ProgressBar>,
    hidden: bool,
}

impl Default for BarRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl BarRenderer {
    pub fn new() -> Self {
        Self {
            bar: None,
            hidden: false,
        }
    }

    /// Draws nothing; used where no terminal is attached.
    pub fn hidden() -> Self {
        Self {
            bar: None,
            hidden: true,
        }
    }

    fn start_item(&mut self, label: &str, duration: Option<u64>) {
        self.finish_bar();
        let bar = match duration {
            Some(total) => ProgressBar::new(total).with_style(timed_style()),
            None => ProgressBar::new_spinner().with_style(spinner_style()),
        };
        if self.hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_prefix(label.to_string());
        self.bar = Some(bar);
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }

    fn println(&self, text: &str) {
        match &self.bar {
            Some(bar) if !self.hidden => bar.println(text),
            Some(_) => {}
            None if !self.hidden => eprintln!("{}", text),
            None => {}
        }
    }

    fn line(&mut self, output: &str, status: LineStatus, category: LineCategory, elapsed: Option<(u64, String)>) {
        match status {
            LineStatus::Stop | LineStatus::Failed => {
                self.println(output);
                return;
            }
            LineStatus::Exited(_) => return,
            LineStatus::Running => {}
        }

        let Some(bar) = &self.bar else {
            return;
        };
        match (elapsed, category) {
            (Some((position, caption)), _) => {
                if bar.length().is_some_and(|len| len > 0) {
                    bar.set_position(position.min(bar.length().unwrap_or(position)));
                }
                bar.set_message(caption);
            }
            (None, LineCategory::Error | LineCategory::Warning) => self.println(output),
            (None, _) => {
                bar.set_message(output.trim().to_string());
                bar.tick();
            }
        }
    }

    pub fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(ProgressBar::position)
    }
}

impl Render for BarRenderer {
    fn render(&mut self, event: &ProgressEvent) -> Result<()> {
        match event {
            ProgressEvent::Line {
                output,
                status,
                category,
                progress,
                ..
            } => {
                let elapsed = progress.as_ref().map(|p| {
                    let caption = match &p.eta {
                        Some(eta) => format!("{} ETA {}", p.caption, eta),
                        None => p.caption.clone(),
                    };
                    (p.elapsed, caption)
                });
                self.line(output, *status, *category, elapsed);
            }
            ProgressEvent::DownloadLine {
                percent,
                total_bytes,
                speed,
                eta,
            } => {
                if let Some(bar) = &self.bar {
                    bar.set_message(format!("{} of {} at {} ETA {}", percent, total_bytes, speed, eta));
                    bar.tick();
                }
            }
            ProgressEvent::Count {
                count,
                source,
                destination,
                duration,
                end,
            } => match end {
                ItemEnd::Started => {
                    self.start_item(count, *duration);
                    self.println(&format!("{}: {}", count, source));
                }
                ItemEnd::Continue => {
                    if let Some(bar) = &self.bar {
                        bar.reset();
                        bar.set_message(format!("next pass for {}", destination));
                    }
                }
                ItemEnd::Done => {
                    if let Some(bar) = self.bar.take() {
                        bar.finish_with_message(format!("done: {}", destination));
                    }
                }
                ItemEnd::Error => {
                    if let Some(bar) = self.bar.take() {
                        bar.abandon_with_message(format!("failed: {}", source));
                    }
                }
            },
            ProgressEvent::End { .. } => self.finish_bar(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;

    #[test]
    fn test_json_renderer_writes_one_line_per_event() {
        let mut renderer = JsonRenderer::new(Vec::new());
        renderer
            .render(&ProgressEvent::output_line("frame=1 time=00:00:01.00 speed=1x", Some(2_000)))
            .unwrap();
        renderer.render(&ProgressEvent::End { completed: Some(vec![]) }).unwrap();

        let text = String::from_utf8(renderer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "LINE");
        assert_eq!(first["progress"]["elapsed"], 1_000);
        assert_eq!(lines[1], r#"{"kind":"END","completed":[]}"#);
    }

    #[test]
    fn test_bar_follows_elapsed_time() {
        let mut renderer = BarRenderer::hidden();
        renderer
            .render(&ProgressEvent::Count {
                count: "File 1/1".to_string(),
                source: "in.mkv".to_string(),
                destination: "out.mkv".to_string(),
                duration: Some(30_000),
                end: ItemEnd::Started,
            })
            .unwrap();
        renderer
            .render(&ProgressEvent::output_line("frame=9 time=00:00:10.00 speed=2x", Some(30_000)))
            .unwrap();
        assert_eq!(renderer.position(), Some(10_000));

        renderer
            .render(&ProgressEvent::Count {
                count: "File 1/1".to_string(),
                source: "in.mkv".to_string(),
                destination: "out.mkv".to_string(),
                duration: Some(30_000),
                end: ItemEnd::Done,
            })
            .unwrap();
        assert_eq!(renderer.position(), None);
    }

    #[tokio::test]
    async fn test_drain_stops_at_end() {
        let (tx, rx) = event::channel();
        tx.send(ProgressEvent::End { completed: None }).unwrap();
        tx.send(ProgressEvent::output_line("after end", None)).unwrap();

        tokio_test::assert_ok!(drain(rx, BarRenderer::hidden()).await);
    }
}
