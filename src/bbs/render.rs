//! Render instructions handed to the screen renderer.
//!
//! The engine never builds terminal bytes itself: it produces a [`ScreenRequest`]
//! and lightbar cells, and a [`ScreenRenderer`] turns them into output text.

use super::menu::MenuOption;

/// Position and label of one pulldown option on screen. Rows and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightbarCell {
    /// Index into the loaded pulldown sequence.
    pub index: usize,
    pub row: u16,
    pub col: u16,
    pub text: String,
}

/// Template with its pulldown markers removed, plus the derived cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightbarMatrix {
    pub screen: String,
    pub cells: Vec<LightbarCell>,
}

/// Everything needed to draw a menu.
#[derive(Debug, Clone)]
pub struct ScreenRequest<'a> {
    pub title: &'a str,
    pub screen: &'a str,
    pub cells: &'a [LightbarCell],
    pub active: Option<usize>,
    pub prompt: Option<&'a str>,
}

pub trait ScreenRenderer: Send + Sync {
    /// Full menu screen.
    fn render_screen(&self, request: &ScreenRequest<'_>) -> String;

    /// Repaint of a single lightbar cell.
    fn render_cell(&self, cell: &LightbarCell, highlighted: bool) -> String;
}

/// Plain VT100 renderer: clears the screen, prints the template, positions cells
/// with cursor addressing and shows the active one in reverse video.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnsiRenderer;

impl ScreenRenderer for AnsiRenderer {
    fn render_screen(&self, request: &ScreenRequest<'_>) -> String {
        let mut out = String::from("\x1b[2J\x1b[H");
        out.push_str(request.screen);
        for cell in request.cells {
            out.push_str(&self.render_cell(cell, request.active == Some(cell.index)));
        }
        if let Some(last_row) = request.cells.iter().map(|c| c.row).max() {
            out.push_str(&format!("\x1b[{};1H", last_row.saturating_add(1)));
        }
        if let Some(prompt) = request.prompt {
            out.push_str(prompt);
        }
        out
    }

    fn render_cell(&self, cell: &LightbarCell, highlighted: bool) -> String {
        if highlighted {
            format!("\x1b[{};{}H\x1b[7m{}\x1b[0m", cell.row, cell.col, cell.text)
        } else {
            format!("\x1b[{};{}H{}", cell.row, cell.col, cell.text)
        }
    }
}

const MARKER: &str = "%PD";

/// Locate `%PDnn` markers in `template` and derive a cell for every pulldown.
///
/// A marker's position becomes the cell position of the pulldown whose
/// `pulldown_id` is `nn`; markers are stripped from the returned screen.
/// Pulldowns without a marker are stacked below the last template row.
pub fn build_lightbar_matrix(template: &str, pulldowns: &[MenuOption]) -> LightbarMatrix {
    let mut screen = String::with_capacity(template.len());
    let mut positions: Vec<(u16, u16, u16)> = Vec::new(); // (id, row, col)
    let (mut row, mut col) = (1u16, 1u16);

    let mut rest = template;
    while let Some(ch) = rest.chars().next() {
        if let Some(id) = marker_id(rest) {
            positions.push((id, row, col));
            rest = &rest[MARKER.len() + 2..];
            continue;
        }
        match ch {
            '\n' => {
                row = row.saturating_add(1);
                col = 1;
            }
            '\r' => col = 1,
            _ => col = col.saturating_add(1),
        }
        screen.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    let mut next_free_row = if col > 1 { row.saturating_add(1) } else { row };
    let cells = pulldowns
        .iter()
        .enumerate()
        .map(|(index, option)| {
            let text = if option.name.is_empty() {
                option.menu_key.clone()
            } else {
                option.name.clone()
            };
            match positions.iter().find(|(id, _, _)| *id == option.pulldown_id) {
                Some(&(_, row, col)) => LightbarCell { index, row, col, text },
                None => {
                    let cell = LightbarCell {
                        index,
                        row: next_free_row,
                        col: 1,
                        text,
                    };
                    next_free_row = next_free_row.saturating_add(1);
                    cell
                }
            }
        })
        .collect();

    LightbarMatrix { screen, cells }
}

fn marker_id(s: &str) -> Option<u16> {
    let digits = s.strip_prefix(MARKER)?.get(..2)?;
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pd(name: &str, id: u16) -> MenuOption {
        MenuOption::new("", "{G", "").named(name).with_pulldown(id)
    }

    #[test]
    fn markers_become_cells_and_are_stripped() {
        let m = build_lightbar_matrix("Title\r\n  %PD01  %PD02\r\n", &[pd("Logon", 1), pd("Apply", 2)]);
        assert_eq!(m.screen, "Title\r\n    \r\n");
        assert_eq!(m.cells[0], LightbarCell { index: 0, row: 2, col: 3, text: "Logon".into() });
        assert_eq!(m.cells[1], LightbarCell { index: 1, row: 2, col: 5, text: "Apply".into() });
    }

    #[test]
    fn unmarked_pulldowns_stack_below_template() {
        let m = build_lightbar_matrix("Top\r\nBottom", &[pd("One", 7), pd("Two", 8)]);
        assert_eq!((m.cells[0].row, m.cells[0].col), (3, 1));
        assert_eq!((m.cells[1].row, m.cells[1].col), (4, 1));
    }

    #[test]
    fn partial_markers_are_plain_text() {
        let m = build_lightbar_matrix("100%PD and %PDx1", &[]);
        assert_eq!(m.screen, "100%PD and %PDx1");
        assert!(m.cells.is_empty());
    }

    #[test]
    fn renderer_highlights_active_cell_only() {
        let cells = vec![
            LightbarCell { index: 0, row: 2, col: 3, text: "A".into() },
            LightbarCell { index: 1, row: 3, col: 3, text: "B".into() },
        ];
        let out = AnsiRenderer.render_screen(&ScreenRequest {
            title: "t",
            screen: "S",
            cells: &cells,
            active: Some(1),
            prompt: Some("Cmd: "),
        });
        assert!(out.contains("\x1b[2;3HA"));
        assert!(out.contains("\x1b[3;3H\x1b[7mB\x1b[0m"));
        assert!(out.ends_with("\x1b[4;1HCmd: "));
    }
}
