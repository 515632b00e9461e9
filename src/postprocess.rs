use crate::config::Config;
use crate::parser::{self, HeadingTable, SummaryFields};
use unicode_normalization::UnicodeNormalization;

/// Clean up a raw model response before it is parsed into sections.
pub fn normalize_response(cfg: &Config, raw: &str) -> String {
    let mut out = raw.to_string();

    if cfg.postprocess.normalize_newlines {
        out = out.replace("\r\n", "\n");
    }

    if cfg.postprocess.normalize_unicode {
        out = out.nfkc().collect::<String>();
    }

    out = sanitize_control_chars(&out, &cfg.postprocess.control_chars_to_sanitize);

    if cfg.postprocess.trim_trailing_whitespace {
        out = out
            .lines()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
    }

    out
}

/// Normalize then parse; the form every pipeline consumer wants.
pub fn parse_response(cfg: &Config, headings: &HeadingTable, raw: &str) -> SummaryFields {
    parser::parse(&normalize_response(cfg, raw), headings)
}

fn sanitize_control_chars(s: &str, codes: &[u8]) -> String {
    if codes.is_empty() {
        return s.to_string();
    }

    let mut mask = [false; 128];
    for &code in codes {
        if (code as usize) < mask.len() {
            mask[code as usize] = true;
        }
    }

    s.chars()
        .filter(|&ch| {
            // Line structure carries the section layout.
            if ch == '\n' || ch == '\r' || ch == '\t' {
                return true;
            }
            let cp = ch as u32;
            if cp < 128 { !mask[cp as usize] } else { true }
        })
        .collect()
}
