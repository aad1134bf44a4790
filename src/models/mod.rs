use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` when either component is out of range or not finite.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// A place descriptor as handed to the distance tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Location {
    Coordinates(Coordinates),
    Zipcode(String),
    Address(String),
}

fn zipcode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("valid zipcode regex"))
}

pub fn is_valid_zipcode(value: &str) -> bool {
    zipcode_pattern().is_match(value.trim())
}

impl Location {
    /// Classify a free-form descriptor: `"lat, lon"`, a US zipcode, or an address.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some((lat, lon)) = trimmed.split_once(',') {
            if let (Ok(lat), Ok(lon)) = (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
                return Coordinates::new(lat, lon).map(Location::Coordinates);
            }
        }

        if is_valid_zipcode(trimmed) {
            // ZIP+4 resolves at the 5-digit level
            return Some(Location::Zipcode(trimmed[..5].to_string()));
        }

        Some(Location::Address(trimmed.to_string()))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Coordinates(c) => write!(f, "{}", c),
            Location::Zipcode(z) => write!(f, "zipcode {}", z),
            Location::Address(a) => write!(f, "{}", a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceQuery {
    pub origin: Location,
    pub destination: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceResult {
    pub miles: f64,
    pub origin: Coordinates,
    pub destination: Coordinates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Population {
    Known(u64),
    Unknown,
}

impl Population {
    pub fn count(&self) -> Option<u64> {
        match self {
            Population::Known(n) => Some(*n),
            Population::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    pub city: String,
    pub state: String,
    pub population: Population,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorCandidate {
    pub name: String,
    pub website: String,
    pub oem: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Invalid,
    Uncertain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub candidate: CompetitorCandidate,
    pub verdict: Verdict,
    pub evidence: Vec<String>,
}

/// Request body shared by both crew routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewInput {
    pub zipcode: String,
    pub dealership: String,
    pub customer: String,
    pub person: String,
}

impl CrewInput {
    pub fn as_pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("zipcode", self.zipcode.as_str()),
            ("dealership", self.dealership.as_str()),
            ("customer", self.customer.as_str()),
            ("person", self.person.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewOutput {
    pub result: String,
}
