use crate::utils::text::{display_width, wrap_text};
use console::style;
use std::io::{self, Write};
use termimad::MadSkin;
use termimad::crossterm::style::Color;

fn skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.set_headers_fg(Color::Cyan);
    skin.bold.set_fg(Color::Yellow);
    skin.inline_code.set_fg(Color::Green);
    skin.code_block.set_fg(Color::Green);
    skin
}

/// Renders assistant output as markdown in the terminal.
pub fn display_markdown(text: &str) {
    skin().print_text(text);
}

/// Heuristic for whether a response is worth running through the markdown
/// renderer at all.
pub fn looks_like_markdown(text: &str) -> bool {
    text.contains("```") || text.contains('*') || text.contains('`') || text.contains('#')
}

/// Plain response in a bordered box, wrapped to the terminal width.
pub fn display_response(response: &str) {
    let term = console::Term::stdout();
    let terminal_width = term.size().1 as usize;
    let max_width = std::cmp::min(terminal_width.saturating_sub(4), 120).max(60);

    let mut lines = Vec::new();
    for line in response.lines() {
        lines.extend(wrap_text(line, max_width.saturating_sub(4)));
    }

    let content_width = lines.iter().map(|l| display_width(l)).max().unwrap_or(0);
    let box_width = std::cmp::min(max_width, content_width + 4);

    let top = "┌".to_string() + &"─".repeat(box_width - 2) + "┐";
    let bottom = "└".to_string() + &"─".repeat(box_width - 2) + "┘";

    println!("\n{}", style("Archie").bold().blue());
    println!("{}", style(&top).dim().blue());
    for line in lines {
        let padding = box_width.saturating_sub(display_width(&line) + 3);
        println!("│ {}{}│", style(&line).white(), " ".repeat(padding));
    }
    println!("{}", style(&bottom).dim().blue());
}

pub fn display_error(message: &str) {
    eprintln!("{} {}", style("✗").bold().red(), style(message).red());
}

pub fn display_notice(message: &str) {
    println!("{} {}", style("•").bold().cyan(), message);
}

/// Chat-mode banner with the active provider and model.
pub fn display_welcome(provider: Option<&str>, model: Option<&str>) {
    println!(
        "\n{} {}",
        style("Archie").bold().magenta(),
        style("interactive chat").dim()
    );
    println!(
        "{} provider: {}  model: {}",
        style("•").dim(),
        style(provider.unwrap_or("not configured")).cyan(),
        style(model.unwrap_or("auto")).cyan()
    );
    println!(
        "{}",
        style("Type '/help' for commands. Ctrl-C stops a response, Ctrl-D exits.").dim()
    );
}

/// Yes/no prompt, defaulting to no.
pub fn prompt_confirmation(question: &str) -> bool {
    print!(
        "{} {} {} ",
        style("?").bold().yellow(),
        style(question).bold(),
        style("[y/N]").dim()
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    input.trim().eq_ignore_ascii_case("y")
}
