use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(keys: &[&'static str], pad: usize, action: &'static str) -> Line<'static> {
    let mut spans = vec![Span::raw("  ")];
    let mut width = 0;
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" / "));
            width += 3;
        }
        spans.push(Span::styled(*key, Style::default().fg(Color::Magenta)));
        width += key.chars().count();
    }
    spans.push(Span::raw(" ".repeat(pad.saturating_sub(width).max(1))));
    spans.push(Span::raw(action));
    Line::from(spans)
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    const PAD: usize = 16;
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line(&["q", "Ctrl-C"], PAD, "Quit"),
        key_line(&["space", "p"], PAD, "Play/Pause"),
        key_line(&["n", "."], PAD, "Single step"),
        key_line(&["+", "-"], PAD, "Step slider (ticks per step = slider²)"),
        key_line(&["tab"], PAD, "Switch tabs"),
        key_line(&["?"], PAD, "Show this help"),
        Line::from(""),
        Line::from("Camera:"),
        key_line(&["↑↓←→", "wasd"], PAD, "Move view by 100"),
        key_line(&["drag"], PAD, "Pan with the mouse"),
        key_line(&["wheel"], PAD, "Scroll the view"),
        Line::from(""),
        Line::from("World:"),
        key_line(&["[", "]"], PAD, "Food density -/+ 10"),
        key_line(&["m"], PAD, "Toggle asexual/sexual reproduction"),
        key_line(&["e"], PAD, "Export snapshot CSV"),
        key_line(&["y"], PAD, "Copy exported path to clipboard"),
        Line::from(""),
        Line::from("Batch:"),
        key_line(&["b"], PAD, "Launch batch runs"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled(
                "Results are saved when the terminal has focus.",
                Style::default().fg(Color::Gray),
            ),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
