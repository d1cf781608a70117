//! SVG word cloud.

use std::path::Path;

use log::{debug, info};
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;

use crate::error::{Result, SurveyError};
use crate::tokenize::is_cjk;

#[derive(Debug, Clone)]
pub struct WordCloudOptions {
    pub width: u32,
    pub height: u32,
    pub max_words: usize,
    pub min_font_size: f64,
    pub max_font_size: f64,
    pub font_family: String,
}

impl Default for WordCloudOptions {
    fn default() -> Self {
        WordCloudOptions {
            width: 1600,
            height: 1200,
            max_words: 40,
            min_font_size: 18.0,
            max_font_size: 160.0,
            font_family: "sans-serif".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedWord {
    pub word: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub font_size: f64,
    pub color: (u8, u8, u8),
}

impl PlacedWord {
    fn overlaps(&self, x: i32, y: i32, w: i32, h: i32) -> bool {
        x < self.x + self.width && self.x < x + w && y < self.y + self.height && self.y < y + h
    }
}

const VIRIDIS: [(u8, u8, u8); 6] = [
    (68, 1, 84),
    (65, 68, 135),
    (42, 120, 142),
    (34, 168, 132),
    (122, 209, 81),
    (253, 231, 37),
];

/// Colour at position `t` in `[0, 1]` of the viridis map.
pub fn viridis(t: f64) -> (u8, u8, u8) {
    let t = t.clamp(0.0, 1.0) * (VIRIDIS.len() - 1) as f64;
    let i = (t.floor() as usize).min(VIRIDIS.len() - 2);
    let f = t - i as f64;
    let (a, b) = (VIRIDIS[i], VIRIDIS[i + 1]);
    let lerp = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * f).round() as u8;
    (lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

/// Width of a rendered word; wide characters take a full em.
fn text_width(word: &str, size: f64) -> i32 {
    let ems: f64 = word.chars().map(|c| if is_cjk(c) { 1.0 } else { 0.6 }).sum();
    (ems * size).ceil() as i32
}

/// Place the most frequent words along an Archimedean spiral from the
/// centre. Words that find no free spot inside the canvas are dropped.
pub fn layout_words(freqs: &[(String, u32)], opts: &WordCloudOptions) -> Vec<PlacedWord> {
    let words: Vec<&(String, u32)> = freqs.iter().take(opts.max_words).collect();
    let (Some(hi), Some(lo)) = (
        words.iter().map(|w| w.1).max(),
        words.iter().map(|w| w.1).min(),
    ) else {
        return Vec::new();
    };
    let (cw, ch) = (opts.width as i32, opts.height as i32);
    let limit = cw.max(ch) as f64;
    let mut placed: Vec<PlacedWord> = Vec::new();

    for (rank, (word, count)) in words.iter().enumerate() {
        let scale = if hi == lo {
            1.0
        } else {
            (count - lo) as f64 / (hi - lo) as f64
        };
        let font_size = opts.min_font_size + (opts.max_font_size - opts.min_font_size) * scale;
        let w = text_width(word, font_size);
        let h = font_size.ceil() as i32;
        if w > cw || h > ch {
            debug!("'{word}' is larger than the canvas, skipped");
            continue;
        }

        let mut theta: f64 = 0.0;
        let spot = loop {
            let r = 2.0 * theta;
            if r > limit {
                break None;
            }
            let x = cw / 2 + (r * theta.cos()) as i32 - w / 2;
            let y = ch / 2 + (r * theta.sin()) as i32 - h / 2;
            let inside = x >= 0 && y >= 0 && x + w <= cw && y + h <= ch;
            if inside && !placed.iter().any(|p| p.overlaps(x, y, w, h)) {
                break Some((x, y));
            }
            theta += 0.1;
        };
        let Some((x, y)) = spot else {
            debug!("no room left for '{word}'");
            continue;
        };
        let t = if words.len() > 1 {
            rank as f64 / (words.len() - 1) as f64
        } else {
            0.0
        };
        placed.push(PlacedWord {
            word: word.clone(),
            x,
            y,
            width: w,
            height: h,
            font_size,
            color: viridis(t),
        });
    }
    placed
}

/// Render the cloud to an SVG file.
pub fn render_wordcloud(
    freqs: &[(String, u32)],
    path: &Path,
    opts: &WordCloudOptions,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let placed = layout_words(freqs, opts);
    let render = |e: DrawingAreaErrorKind<std::io::Error>| SurveyError::Render(e.to_string());

    let root = SVGBackend::new(path, (opts.width, opts.height)).into_drawing_area();
    root.fill(&WHITE).map_err(render)?;
    for p in &placed {
        let (r, g, b) = p.color;
        let style = (opts.font_family.as_str(), p.font_size)
            .into_font()
            .color(&RGBColor(r, g, b));
        root.draw(&Text::new(p.word.as_str(), (p.x, p.y), style))
            .map_err(render)?;
    }
    root.present().map_err(render)?;
    info!(
        "Word cloud with {} words written to {}",
        placed.len(),
        path.display()
    );
    Ok(())
}
