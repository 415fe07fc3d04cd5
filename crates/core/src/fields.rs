use crate::dates::DateNormalizer;
use crate::error::ExtractError;
use crate::models::{BuildingInfo, CoverageType, NormalizedDate, PolicyMetadata};
use regex::Regex;

const DATE: &str = r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}[/-]\d{1,2}[/-]\d{1,2}|[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}\s+[A-Za-z]{3,9}\.?,?\s+\d{4}";

const WELL_KNOWN_CARRIERS: &[&str] = &[
    "State Farm",
    "Allstate",
    "Liberty Mutual",
    "Travelers",
    "Nationwide",
    "Progressive",
    "Farmers",
    "USAA",
    "Chubb",
    "The Hartford",
    "Zurich",
    "AIG",
    "Berkshire Hathaway",
    "CNA",
    "Erie Insurance",
    "American Family",
    "Hanover",
    "Cincinnati Financial",
];

pub struct FieldRecognizer {
    policy_number: Vec<Regex>,
    carrier: Vec<Regex>,
    known_carriers: Vec<(Regex, &'static str)>,
    coverage: Vec<(Regex, CoverageType)>,
    policy_period: Regex,
    effective_date: Regex,
    expiration_date: Regex,
    issue_date: Regex,
    premium: Vec<Regex>,
    limit: Regex,
    deductible: Regex,
    address: Vec<Regex>,
    building_name: Vec<Regex>,
    dates: DateNormalizer,
}

impl FieldRecognizer {
    pub fn new() -> Result<Self, ExtractError> {
        let policy_number = vec![
            Regex::new(r"(?i)\bpolicy\s*(?:number\b|no\b\.?|#)\s*:?\s*([A-Z0-9][A-Z0-9-]{2,})")?,
            Regex::new(r"(?i)\b(?:policy|contract)\s+([A-Z]{2,}-?\d{4,}-?\d+)")?,
            Regex::new(r"\b([A-Z]{2,}-\d{4}-\d{3,})\b")?,
        ];

        let carrier = vec![
            Regex::new(
                r"(?im)\b(?:insurance\s+company|carrier|insurer)[ \t]*:[ \t]*([A-Za-z][A-Za-z &.,'-]*?)[ \t]*\r?$",
            )?,
            Regex::new(
                r"\b((?:[A-Z][A-Za-z&.'-]*[ \t]+){1,4}(?:Insurance[ \t]+(?:Company|Group|Corporation|Corp\.?)|Mutual[ \t]+Insurance))",
            )?,
        ];

        let known_carriers = WELL_KNOWN_CARRIERS
            .iter()
            .map(|name| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))).map(|re| (re, *name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let coverage = vec![
            (Regex::new(r"(?i)\bgeneral\s+liability")?, CoverageType::GeneralLiability),
            (Regex::new(r"(?i)\bproperty\s+(?:insurance|coverage)")?, CoverageType::Property),
            (
                Regex::new(r"(?i)\bumbrella\s+(?:coverage|insurance|liability)")?,
                CoverageType::Umbrella,
            ),
            (Regex::new(r"(?i)\bflood\s+(?:insurance|coverage)")?, CoverageType::Flood),
            (
                Regex::new(r"(?i)\bearthquake\s+(?:insurance|coverage)")?,
                CoverageType::Earthquake,
            ),
            (
                Regex::new(r"(?i)\bworkers?'?\s*comp(?:ensation)?\b")?,
                CoverageType::WorkersCompensation,
            ),
        ];

        let policy_period = Regex::new(&format!(
            r"(?i)policy\s+period\s*:?\s*(?:from\s+)?({DATE})\s*(?:to|through|thru|until|-|–)\s*({DATE})"
        ))?;
        let effective_date = Regex::new(&format!(
            r"(?i)\b(?:effective|inception)\s*(?:date)?\s*:?\s*({DATE})"
        ))?;
        let expiration_date = Regex::new(&format!(
            r"(?i)\b(?:expiration|expiry|expires)\s*(?:date|on)?\s*:?\s*({DATE})"
        ))?;
        let issue_date = Regex::new(&format!(
            r"(?i)\b(?:issue\s*date|date\s+(?:of\s+)?issue[d]?|issued(?:\s+on)?)\s*:?\s*({DATE})"
        ))?;

        let premium = vec![
            Regex::new(r"(?i)\bpremium\s*:?\s*\$?\s*([\d,]+(?:\.\d+)?)")?,
            Regex::new(r"(?i)\bannual\s*premium\s*:?\s*\$?\s*([\d,]+(?:\.\d+)?)")?,
            Regex::new(r"(?i)\btotal\s*premium\s*:?\s*\$?\s*([\d,]+(?:\.\d+)?)")?,
        ];

        let address = vec![
            Regex::new(
                r"(?i)\b(?:property|building|address|location)\s*(?:address)?\s*:\s*([^\n]*\d+[^\n]*\b(?:street|st|avenue|ave|road|rd|blvd|boulevard|drive|dr|lane|ln|way)\b[^\n]*)",
            )?,
            Regex::new(
                r"(?i)\b(\d+\s+[A-Za-z ]+\b(?:street|st|avenue|ave|road|rd|blvd|boulevard|drive|dr|lane|ln|way)\b[^\n]*)",
            )?,
        ];
        let building_name = vec![
            Regex::new(r"(?i)\b(?:property|building)\s*name\s*:?\s*([^\n]+)")?,
            Regex::new(r"(?i)\binsured\s*property\s*:?\s*([^\n]+)")?,
        ];

        Ok(Self {
            policy_number,
            carrier,
            known_carriers,
            coverage,
            policy_period,
            effective_date,
            expiration_date,
            issue_date,
            premium,
            limit: Regex::new(r"(?i)\blimit\s*:?\s*\$?\s*([\d,]+)")?,
            deductible: Regex::new(r"(?i)\bdeductible\s*:?\s*\$?\s*([\d,]+)")?,
            address,
            building_name,
            dates: DateNormalizer::new()?,
        })
    }

    pub fn dates(&self) -> &DateNormalizer {
        &self.dates
    }

    /// Only `carrier_raw` is filled for the carrier; canonicalization is left
    /// to the caller's carrier table.
    pub fn recognize(&self, text: &str) -> PolicyMetadata {
        let mut metadata = PolicyMetadata::default();
        if text.trim().is_empty() {
            return metadata;
        }

        metadata.policy_number = first_capture(&self.policy_number, text);
        metadata.carrier_raw = self.recognize_carrier(text);
        metadata.coverage_type = self
            .coverage
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, coverage)| *coverage);

        if let Some(captures) = self.policy_period.captures(text) {
            metadata.effective_date = captures.get(1).map(|m| self.dates.parse(m.as_str()));
            metadata.expiration_date = captures.get(2).map(|m| self.dates.parse(m.as_str()));
        }
        if metadata.effective_date.is_none() {
            metadata.effective_date = self.labelled_date(&self.effective_date, text);
        }
        if metadata.expiration_date.is_none() {
            metadata.expiration_date = self.labelled_date(&self.expiration_date, text);
        }
        metadata.issue_date = self.labelled_date(&self.issue_date, text);

        metadata.premium = self.recognize_premium(text);
        metadata.limits_found = all_amounts(&self.limit, text);
        metadata.deductibles_found = all_amounts(&self.deductible, text);

        metadata
    }

    pub fn recognize_building(&self, text: &str) -> BuildingInfo {
        BuildingInfo {
            address: first_capture(&self.address, text),
            name: first_capture(&self.building_name, text),
        }
    }

    fn recognize_carrier(&self, text: &str) -> Option<String> {
        first_capture(&self.carrier, text)
            .map(|raw| raw.trim_end_matches([',', ' ']).to_string())
            .filter(|raw| !raw.is_empty())
            .or_else(|| {
                self.known_carriers
                    .iter()
                    .find(|(pattern, _)| pattern.is_match(text))
                    .map(|(_, name)| name.to_string())
            })
    }

    fn recognize_premium(&self, text: &str) -> Option<f64> {
        self.premium.iter().find_map(|pattern| {
            let captured = pattern.captures(text)?.get(1)?.as_str().replace(',', "");
            captured.parse::<f64>().ok()
        })
    }

    fn labelled_date(&self, pattern: &Regex, text: &str) -> Option<NormalizedDate> {
        pattern
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|m| self.dates.parse(m.as_str()))
    }
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn all_amounts(pattern: &Regex, text: &str) -> Vec<String> {
    pattern
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().replace(',', ""))
        .filter(|amount| !amount.is_empty())
        .collect()
}
