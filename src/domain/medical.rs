//! Health-record rules (PHI).
//!
//! Most of these are label-driven: the value is the first capture group
//! following a label such as `MRN:` or `diagnosed with`.

use super::RuleMatcher;
use once_cell::sync::Lazy;
use regex::Regex;

static MEDICAL_RECORD_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:MRN|medical record(?: number| no\.?| #)?)[:#\s]*(\d{6,})").expect("Valid MRN regex")
});

static HEALTH_PLAN_BENEFICIARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bmember ID[:#\s]*([A-Za-z0-9]{8,})").expect("Valid member ID regex")
});

static MEDICAL_CONDITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:diagnosed with|suffers from|condition:)\s*([A-Za-z][A-Za-z ]{4,29})")
        .expect("Valid condition regex")
});

static MEDICATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:prescribed|taking|medication:)\s*([A-Za-z]{4,20})")
        .expect("Valid medication regex")
});

static DOCTOR_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bDr\.?\s+([A-Z][a-z]+\s+[A-Z][a-z]+)").expect("Valid doctor regex")
});

static HOSPITAL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b((?:[A-Z][a-z]+ )+(?:Hospital|Medical Center|Clinic))\b")
        .expect("Valid hospital regex")
});

pub fn medical_record_number() -> RuleMatcher {
    RuleMatcher::new("Medical Record Number", &MEDICAL_RECORD_NUMBER, 0.9)
}

pub fn health_plan_beneficiary_number() -> RuleMatcher {
    RuleMatcher::new("Health Plan Beneficiary Number", &HEALTH_PLAN_BENEFICIARY, 0.85)
}

pub fn medical_condition() -> RuleMatcher {
    RuleMatcher::new("Medical Condition", &MEDICAL_CONDITION, 0.7)
}

pub fn medication() -> RuleMatcher {
    RuleMatcher::new("Medication", &MEDICATION, 0.7)
}

pub fn doctor_name() -> RuleMatcher {
    RuleMatcher::new("Doctor Name", &DOCTOR_NAME, 0.85)
}

pub fn hospital_name() -> RuleMatcher {
    RuleMatcher::new("Hospital Name", &HOSPITAL_NAME, 0.75)
}
