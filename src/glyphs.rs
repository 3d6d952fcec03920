// Bitmap font module
// 5x7 glyphs for the screenshot labels and buttons

use crate::compose::Canvas;

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
/// Advance between characters, in font pixels
const ADVANCE: u32 = 6;

type Glyph = [[u8; 5]; 7];

fn glyph(ch: char) -> Option<Glyph> {
    let g = match ch {
        '0' => [
            [0,1,1,1,0],
            [1,0,0,0,1],
            [1,0,0,1,1],
            [1,0,1,0,1],
            [1,1,0,0,1],
            [1,0,0,0,1],
            [0,1,1,1,0],
        ],
        '1' => [
            [0,0,1,0,0],
            [0,1,1,0,0],
            [0,0,1,0,0],
            [0,0,1,0,0],
            [0,0,1,0,0],
            [0,0,1,0,0],
            [0,1,1,1,0],
        ],
        '2' => [
            [0,1,1,1,0],
            [1,0,0,0,1],
            [0,0,0,0,1],
            [0,0,0,1,0],
            [0,0,1,0,0],
            [0,1,0,0,0],
            [1,1,1,1,1],
        ],
        '3' => [
            [1,1,1,1,0],
            [0,0,0,0,1],
            [0,0,0,0,1],
            [0,1,1,1,0],
            [0,0,0,0,1],
            [0,0,0,0,1],
            [1,1,1,1,0],
        ],
        '4' => [
            [0,0,0,1,0],
            [0,0,1,1,0],
            [0,1,0,1,0],
            [1,0,0,1,0],
            [1,1,1,1,1],
            [0,0,0,1,0],
            [0,0,0,1,0],
        ],
        '5' => [
            [1,1,1,1,1],
            [1,0,0,0,0],
            [1,1,1,1,0],
            [0,0,0,0,1],
            [0,0,0,0,1],
            [1,0,0,0,1],
            [0,1,1,1,0],
        ],
        '6' => [
            [0,0,1,1,0],
            [0,1,0,0,0],
            [1,0,0,0,0],
            [1,1,1,1,0],
            [1,0,0,0,1],
            [1,0,0,0,1],
            [0,1,1,1,0],
        ],
        '7' => [
            [1,1,1,1,1],
            [0,0,0,0,1],
            [0,0,0,1,0],
            [0,0,1,0,0],
            [0,1,0,0,0],
            [0,1,0,0,0],
            [0,1,0,0,0],
        ],
        '8' => [
            [0,1,1,1,0],
            [1,0,0,0,1],
            [1,0,0,0,1],
            [0,1,1,1,0],
            [1,0,0,0,1],
            [1,0,0,0,1],
            [0,1,1,1,0],
        ],
        '9' => [
            [0,1,1,1,0],
            [1,0,0,0,1],
            [1,0,0,0,1],
            [0,1,1,1,1],
            [0,0,0,0,1],
            [0,0,0,1,0],
            [0,1,1,0,0],
        ],
        'C' => [
            [0,1,1,1,0],
            [1,0,0,0,1],
            [1,0,0,0,0],
            [1,0,0,0,0],
            [1,0,0,0,0],
            [1,0,0,0,1],
            [0,1,1,1,0],
        ],
        'S' => [
            [0,1,1,1,1],
            [1,0,0,0,0],
            [1,0,0,0,0],
            [0,1,1,1,0],
            [0,0,0,0,1],
            [0,0,0,0,1],
            [1,1,1,1,0],
        ],
        'a' => [
            [0,0,0,0,0],
            [0,0,0,0,0],
            [0,1,1,1,0],
            [0,0,0,0,1],
            [0,1,1,1,1],
            [1,0,0,0,1],
            [0,1,1,1,1],
        ],
        'c' => [
            [0,0,0,0,0],
            [0,0,0,0,0],
            [0,1,1,1,0],
            [1,0,0,0,0],
            [1,0,0,0,0],
            [1,0,0,0,0],
            [0,1,1,1,0],
        ],
        'e' => [
            [0,0,0,0,0],
            [0,0,0,0,0],
            [0,1,1,0,0],
            [1,0,0,1,0],
            [1,1,1,1,0],
            [1,0,0,0,0],
            [0,1,1,1,0],
        ],
        'l' => [
            [1,0,0,0,0],
            [1,0,0,0,0],
            [1,0,0,0,0],
            [1,0,0,0,0],
            [1,0,0,0,0],
            [1,0,0,0,0],
            [1,1,1,0,0],
        ],
        'n' => [
            [0,0,0,0,0],
            [0,0,0,0,0],
            [1,0,1,1,0],
            [1,1,0,0,1],
            [1,0,0,0,1],
            [1,0,0,0,1],
            [1,0,0,0,1],
        ],
        'v' => [
            [0,0,0,0,0],
            [0,0,0,0,0],
            [1,0,0,0,1],
            [1,0,0,0,1],
            [1,0,0,0,1],
            [0,1,0,1,0],
            [0,0,1,0,0],
        ],
        'x' => [
            [0,0,0,0,0],
            [0,0,0,0,0],
            [1,0,0,0,1],
            [0,1,0,1,0],
            [0,0,1,0,0],
            [0,1,0,1,0],
            [1,0,0,0,1],
        ],
        ' ' => [[0; 5]; 7],
        _ => return None,
    };
    Some(g)
}

/// Width in pixels of `text` drawn at `scale`
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    ((n - 1) * ADVANCE + GLYPH_W) * scale
}

pub fn text_height(scale: u32) -> u32 {
    GLYPH_H * scale
}

/// Draw `text` with its top-left corner at (x, y). Unknown characters leave a gap.
pub fn draw_text(canvas: &mut Canvas, x: i32, y: i32, text: &str, scale: u32, rgba: [u8; 4]) {
    let mut cx = x;
    for ch in text.chars() {
        if let Some(g) = glyph(ch) {
            for (row, line) in g.iter().enumerate() {
                for (col, &lit) in line.iter().enumerate() {
                    if lit == 1 {
                        canvas.fill_rect(
                            cx + (col as u32 * scale) as i32,
                            y + (row as u32 * scale) as i32,
                            scale,
                            scale,
                            rgba,
                        );
                    }
                }
            }
        }
        cx += (ADVANCE * scale) as i32;
    }
}
