// src/amount.rs

use regex::Regex;
use tracing::debug;

/// A total-amount candidate pulled out of the text.
#[derive(Debug)]
struct Candidate {
    value: f64,
    normalized: String,
    tier: usize,
}

/// Find the best grand-total amount in the text. Returns a normalized
/// decimal string, `"0.00"` when nothing plausible is found.
///
/// Candidates are collected in three priority tiers: explicit grand-total
/// language first, a generic "total" second, bare "amount"/trailing currency
/// figures last. Anything that looks like a subtotal (some other number in
/// the text is more than 10% larger) is discarded, then the survivors are
/// ranked by `(tier, value descending)`.
pub fn best_total(text: &str) -> String {
    let high = [
        Regex::new(r"(?i)total:\s*(?:rwf|usd|\$|€)\s*([0-9][0-9,]*(?:\.[0-9]+)?)").unwrap(),
        Regex::new(
            r"(?i)(?:grand\s+total|final\s+total|amount\s+due|total\s+amount)\s*:?\s*(?:rwf\s*|\$\s*|€\s*)?([0-9][0-9,]*(?:\.[0-9]+)?)",
        )
        .unwrap(),
    ];
    let medium =
        [Regex::new(r"(?i)total\s*:?\s*(?:rwf\s*|\$\s*|€\s*)?([0-9][0-9,]*(?:\.[0-9]+)?)").unwrap()];
    let low = [
        Regex::new(r"(?i)amount\s*:?\s*(?:rwf\s*|\$\s*|€\s*)?([0-9][0-9,]*(?:\.[0-9]+)?)").unwrap(),
        Regex::new(r"(?im)([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:rwf|\$|€)\s*$").unwrap(),
    ];

    let mut candidates: Vec<Candidate> = Vec::new();

    for (tier, patterns) in [&high[..], &medium[..], &low[..]].iter().enumerate() {
        for re in *patterns {
            for cap in re.captures_iter(text) {
                let whole = cap.get(0).unwrap();
                // The regex crate has no lookbehind, so the "total but not
                // subtotal" rule for the medium tier is a positional check
                // on the three bytes before the match.
                if tier == 1 && preceded_by_sub(text, whole.start()) {
                    continue;
                }
                let normalized = cap[1].replace([',', ' '], "");
                let Ok(value) = normalized.parse::<f64>() else {
                    continue;
                };
                if is_likely_subtotal(value, text) {
                    continue;
                }
                candidates.push(Candidate {
                    value,
                    normalized,
                    tier,
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        a.tier.cmp(&b.tier).then(
            b.value
                .partial_cmp(&a.value)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });

    match candidates.first() {
        Some(best) => {
            debug!(total = %best.normalized, tier = best.tier, "Total amount selected");
            best.normalized.clone()
        }
        None => "0.00".to_string(),
    }
}

/// True when the three bytes before `pos` spell "sub" (any case), i.e. the
/// matched "total" is actually part of "subtotal".
fn preceded_by_sub(text: &str, pos: usize) -> bool {
    pos >= 3 && text.is_char_boundary(pos - 3) && text[pos - 3..pos].eq_ignore_ascii_case("sub")
}

/// A candidate is a likely subtotal if any other number anywhere in the
/// text exceeds it by more than 10%.
fn is_likely_subtotal(value: f64, text: &str) -> bool {
    let num_re = Regex::new(r"[0-9][0-9,]*(?:\.[0-9]+)?").unwrap();
    let result = num_re
        .find_iter(text)
        .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .any(|other| other > value * 1.1);
    result
}

/// Strip currency tokens and separators from an amount string. Returns
/// `"0.00"` when the remainder does not parse as a number. Also applied to
/// totals reported by the extraction oracle.
pub fn clean_amount(raw: &str) -> String {
    let cleaned = raw
        .replace(',', "")
        .replace(' ', "")
        .replace("RWF", "")
        .replace('$', "")
        .replace('€', "");
    if cleaned.parse::<f64>().is_ok() {
        cleaned
    } else {
        "0.00".to_string()
    }
}
