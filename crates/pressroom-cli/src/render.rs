use anstyle::{AnsiColor, Style};

pub fn print_status(status: &str, message: &str) {
    println!("{}", render_status_line(status, message));
}

fn render_status_line(status: &str, message: &str) -> String {
    let style = status_style(status);
    format!(
        "{}{status:>6}{} {message}",
        style.render(),
        style.render_reset()
    )
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::Green,
        _ => AnsiColor::Red,
    };
    Style::new().fg_color(Some(color.into())).bold()
}
