//! Welcome banner: "VOTUM" in the built-in figlet font with a vertical gradient.

use crossterm::ExecutableCommand;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use figlet_rs::FIGfont;
use std::io::{Write, stdout};

/// Senate gold (#f1c40f).
const GOLD: (u8, u8, u8) = (0xf1, 0xc4, 0x0f);
/// Ballot blue (#3498db).
const BALLOT_BLUE: (u8, u8, u8) = (0x34, 0x98, 0xdb);

/// Linear interpolation between two RGB colors. `t` in [0.0, 1.0].
fn lerp_rgb(a: (u8, u8, u8), b: (u8, u8, u8), t: f64) -> (u8, u8, u8) {
    let r = (f64::from(a.0) * (1.0 - t) + f64::from(b.0) * t).round() as u8;
    let g = (f64::from(a.1) * (1.0 - t) + f64::from(b.1) * t).round() as u8;
    let bl = (f64::from(a.2) * (1.0 - t) + f64::from(b.2) * t).round() as u8;
    (r, g, bl)
}

/// Banner lines; plain text when the font cannot be loaded.
fn banner_lines() -> Vec<String> {
    FIGfont::standard()
        .ok()
        .and_then(|font| font.convert("VOTUM").map(|figure| figure.to_string()))
        .map(|art| art.lines().map(String::from).collect())
        .unwrap_or_else(|| vec!["VOTUM".to_string()])
}

/// Prints the banner from gold to blue, then version and tagline.
pub fn print_welcome() {
    let mut out = stdout();
    let lines = banner_lines();
    let total = lines.len().max(1);

    for (i, line) in lines.iter().enumerate() {
        let t = if total <= 1 {
            1.0
        } else {
            i as f64 / (total - 1) as f64
        };
        let (r, g, b) = lerp_rgb(GOLD, BALLOT_BLUE, t);
        let _ = out.execute(SetForegroundColor(Color::Rgb { r, g, b }));
        let _ = out.execute(Print(line));
        let _ = out.execute(Print("\r\n"));
        let _ = out.execute(ResetColor);
    }

    let version = env!("CARGO_PKG_VERSION");
    let _ = out.execute(SetForegroundColor(Color::Rgb {
        r: BALLOT_BLUE.0,
        g: BALLOT_BLUE.1,
        b: BALLOT_BLUE.2,
    }));
    let _ = out.execute(Print(format!("v{}\r\n", version)));
    let _ = out.execute(Print("Council motions, weighted votes\r\n"));
    let _ = out.execute(ResetColor);
    let _ = out.flush();
}
