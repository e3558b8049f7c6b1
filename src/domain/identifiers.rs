//! Structured identifier rules: email, SSN, payment cards, network
//! addresses and dates of birth.

use super::RuleMatcher;
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("Valid email regex")
});

static SSN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{3})-(\d{2})-(\d{4})\b").expect("Valid SSN regex"));

static CREDIT_CARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").expect("Valid credit card regex")
});

static IP_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("Valid IP address regex")
});

static WEB_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:https?://|www\.)[^\s<>"')]+"#).expect("Valid URL regex")
});

static BIRTHDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:DOB|D\.O\.B\.|date of birth|birth ?date|born(?: on)?)[:\s]*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}-\d{2}-\d{2})",
    )
    .expect("Valid birthday regex")
});

/// Email addresses.
pub fn email() -> RuleMatcher {
    RuleMatcher::new("Email", &EMAIL, 0.95)
}

/// US social security numbers in `AAA-GG-SSSS` form.
///
/// The whole match is the value, so the digit groups are only used by the
/// validator.
pub fn ssn() -> RuleMatcher {
    RuleMatcher::new("SSN", &SSN_WHOLE, 0.95).with_validator(valid_ssn)
}

static SSN_WHOLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("Valid SSN regex"));

/// Payment card numbers passing the Luhn check.
pub fn credit_card() -> RuleMatcher {
    RuleMatcher::new("Credit Card", &CREDIT_CARD, 0.9).with_validator(luhn_valid)
}

/// Dotted-quad IPv4 addresses.
pub fn ip_address() -> RuleMatcher {
    RuleMatcher::new("IP Address", &IP_ADDRESS, 0.85).with_validator(valid_ipv4)
}

/// http(s) and www URLs.
pub fn web_url() -> RuleMatcher {
    RuleMatcher::new("Web URL", &WEB_URL, 0.85)
}

/// Dates introduced by a birth-date label.
pub fn birthday() -> RuleMatcher {
    RuleMatcher::new("Birthday", &BIRTHDAY, 0.8)
}

/// SSN area/group/serial rules: no 000/666/9xx area, no 00 group, no 0000 serial.
pub fn valid_ssn(candidate: &str) -> bool {
    let Some(caps) = SSN.captures(candidate) else {
        return false;
    };
    let area = &caps[1];
    let group = &caps[2];
    let serial = &caps[3];
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

/// Luhn checksum over the digits of `candidate` (13 to 19 digits).
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn valid_ipv4(candidate: &str) -> bool {
    candidate.split('.').count() == 4
        && candidate.split('.').all(|octet| octet.parse::<u8>().is_ok())
}
