//! Key name vocabulary
//!
//! Controls and configuration name keys the way people write them (`enter`,
//! `esc`, `ctrl+s`); X11 tools want keysyms (`Return`, `Escape`, `ctrl+s`).

/// Translate a key or `+`-joined combination into an X keysym string
pub fn to_keysym(key: &str) -> String {
    key.split('+')
        .map(|part| single_keysym(part.trim()))
        .collect::<Vec<_>>()
        .join("+")
}

fn single_keysym(key: &str) -> String {
    let lower = key.to_lowercase();
    let mapped = match lower.as_str() {
        "enter" | "return" => "Return",
        "tab" => "Tab",
        "esc" | "escape" => "Escape",
        "space" => "space",
        "backspace" => "BackSpace",
        "delete" | "del" => "Delete",
        "up" => "Up",
        "down" => "Down",
        "left" => "Left",
        "right" => "Right",
        "home" => "Home",
        "end" => "End",
        "pageup" | "page_up" => "Prior",
        "pagedown" | "page_down" => "Next",
        "ctrl" | "control" => "ctrl",
        "alt" => "alt",
        "shift" => "shift",
        "super" | "win" | "meta" => "super",
        _ => {
            if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                if (1..=24).contains(&n) {
                    return format!("F{}", n);
                }
            }
            return key.to_string();
        }
    };
    mapped.to_string()
}

/// Whether two key names denote the same key
pub fn same_key(a: &str, b: &str) -> bool {
    to_keysym(a).eq_ignore_ascii_case(&to_keysym(b))
}
