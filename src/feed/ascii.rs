//! ASCII transliteration and HTML escaping of feed values.

use unicode_normalization::UnicodeNormalization;

/// Replacement for characters NFKD does not decompose to ASCII.
fn replacement(c: char) -> Option<&'static str> {
    let replaced = match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' | '\u{00AB}' | '\u{00BB}' => "\"",
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2212}' => "-",
        '\u{2026}' => "...",
        '\u{2022}' => "*",
        '\u{00A0}' | '\u{2009}' | '\u{202F}' => " ",
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'ø' => "o",
        'Ø' => "O",
        'œ' => "oe",
        'Œ' => "OE",
        'ł' => "l",
        'Ł' => "L",
        'đ' => "d",
        'Đ' => "D",
        'þ' => "th",
        'Þ' => "Th",
        _ => return None,
    };
    Some(replaced)
}

/// Transliterate `text` to plain ASCII, dropping what cannot be mapped.
pub fn to_ascii(text: &str) -> String {
    let mut mapped = String::with_capacity(text.len());
    for c in text.chars() {
        match replacement(c) {
            Some(r) => mapped.push_str(r),
            None => mapped.push(c),
        }
    }
    mapped.nfkd().filter(char::is_ascii).collect()
}

/// Escape `text` for HTML and encode non-ASCII characters as numeric
/// entities.
pub fn to_html(text: &str) -> String {
    let escaped = html_escape::encode_text(text);
    let mut out = String::with_capacity(escaped.len());
    for c in escaped.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(&format!("&#{};", c as u32));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_ascii() {
        assert_eq!(to_ascii("Café “déjà vu” – naïve…"), "Cafe \"deja vu\" - naive...");
        assert_eq!(to_ascii("Straße Łódź Œuvre"), "Strasse Lodz OEuvre");
        assert_eq!(to_ascii("東京 Tokyo"), " Tokyo");
        assert_eq!(to_ascii("plain"), "plain");
    }

    #[test]
    fn test_to_html() {
        assert_eq!(to_html("<b>Café</b> & co"), "&lt;b&gt;Caf&#233;&lt;/b&gt; &amp; co");
        assert_eq!(to_html("plain"), "plain");
    }
}
