use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use airlift_core::log::LogSink;
use airlift_core::panel::Color;
use crossterm::queue;
use crossterm::style::{self, Print, ResetColor, SetForegroundColor};

const PIXEL_GLYPH: &str = "●";

/// Log sink printing to stdout and, optionally, a transcript file.
pub struct ConsoleSink {
    transcript: Option<BufWriter<fs::File>>,
    lines: usize,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            transcript: None,
            lines: 0,
        }
    }

    /// Mirrors every line into `path`, truncating any previous transcript.
    pub fn with_transcript(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "# {header}")?;
        writeln!(writer)?;
        writer.flush()?;

        Ok(Self {
            transcript: Some(writer),
            lines: 0,
        })
    }

    pub fn lines(&self) -> usize {
        self.lines
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for ConsoleSink {
    fn write_line(&mut self, line: &str) {
        self.lines += 1;
        println!("{line}");

        let failed = match self.transcript.as_mut() {
            Some(writer) => writeln!(writer, "{line}").and_then(|()| writer.flush()).is_err(),
            None => false,
        };
        if failed {
            eprintln!("transcript write failed; continuing without transcript");
            self.transcript = None;
        }
    }
}

/// Draws the ring as one line of colored dots followed by the status LED.
pub fn render_ring<W: Write>(out: &mut W, pixels: &[Color], status_led: bool) -> io::Result<()> {
    queue!(out, Print("ring "))?;
    for pixel in pixels {
        queue!(
            out,
            SetForegroundColor(style::Color::Rgb {
                r: pixel.r,
                g: pixel.g,
                b: pixel.b,
            }),
            Print(PIXEL_GLYPH)
        )?;
    }
    queue!(
        out,
        ResetColor,
        Print(if status_led { "  led ON\n" } else { "  led off\n" })
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_line_contains_one_glyph_per_pixel() {
        let pixels = [Color::new(255, 0, 0), Color::new(0, 0, 255), Color::OFF];
        let mut out = Vec::new();
        render_ring(&mut out, &pixels, true).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches(PIXEL_GLYPH).count(), 3);
        assert!(text.starts_with("ring "));
        assert!(text.ends_with("led ON\n"));
        assert!(text.contains("\u{1b}["));
    }

    #[test]
    fn transcript_mirrors_log_lines() {
        let path = std::env::temp_dir().join("airlift-emulator-console-test.log");
        let mut sink = ConsoleSink::with_transcript(&path, "test transcript").unwrap();
        sink.write_line("2024-01-01 00:00:00 [loop] INFO: hello");
        drop(sink);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# test transcript\n"));
        assert!(contents.contains("[loop] INFO: hello"));
        let _ = fs::remove_file(&path);
    }
}
