/// Terminal column width of one character. CJK and fullwidth forms take two
/// columns; everything else is treated as one.
pub fn char_width(c: char) -> usize {
    match c {
        '\u{1100}'..='\u{115F}'
        | '\u{2E80}'..='\u{303F}'
        | '\u{3040}'..='\u{33FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{A000}'..='\u{A4CF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FE10}'..='\u{FE19}'
        | '\u{FE30}'..='\u{FE6F}'
        | '\u{FF00}'..='\u{FF60}'
        | '\u{FFE0}'..='\u{FFE6}'
        | '\u{20000}'..='\u{2EBEF}' => 2,
        _ => 1,
    }
}

pub fn display_width(s: &str) -> usize {
    s.chars().map(char_width).sum()
}

/// Wraps text to a maximum display width, preferring to break at spaces.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if display_width(remaining) <= max_width {
            lines.push(remaining.to_string());
            break;
        }

        let mut width = 0;
        let mut last_space = None;
        let mut cut = 0;
        for (pos, c) in remaining.char_indices() {
            let w = char_width(c);
            // always keep at least one character per line so the loop advances
            if cut > 0 && width + w > max_width {
                break;
            }
            if c == ' ' {
                last_space = Some(pos);
            }
            width += w;
            cut = pos + c.len_utf8();
        }

        match last_space {
            Some(space) if space > 0 => {
                lines.push(remaining[..space].to_string());
                remaining = remaining[space + 1..].trim_start();
            }
            _ => {
                lines.push(remaining[..cut].to_string());
                remaining = &remaining[cut..];
            }
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Cuts a string down to a display width, appending an ellipsis when
/// anything was dropped. Used to keep session titles inside table columns.
pub fn truncate_to_width(s: &str, max_width: usize) -> String {
    if display_width(s) <= max_width {
        return s.to_string();
    }
    let budget = max_width.saturating_sub(1);
    let mut width = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = char_width(c);
        if width + w > budget {
            break;
        }
        width += w;
        out.push(c);
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_counts_one_column_cjk_two() {
        assert_eq!(display_width("hello"), 5);
        assert_eq!(display_width("你好"), 4);
        assert_eq!(display_width("hi 你"), 5);
    }

    #[test]
    fn wraps_at_spaces_when_possible() {
        let lines = wrap_text("the quick brown fox", 10);
        assert_eq!(lines, vec!["the quick", "brown fox"]);
    }

    #[test]
    fn hard_breaks_unbroken_runs() {
        let lines = wrap_text("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn wide_characters_respect_the_width_budget() {
        let lines = wrap_text("你好世界", 4);
        assert_eq!(lines, vec!["你好", "世界"]);
    }

    #[test]
    fn truncation_marks_dropped_text() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("a longer title", 8), "a longe…");
    }
}
