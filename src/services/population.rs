use async_trait::async_trait;
use std::time::Duration;

use crate::error::ToolError;
use crate::models::{Population, PopulationRecord};
use crate::services::retry::{check_status, with_retry, RetryPolicy};

/// Cities below this population are not worth an expansion recommendation.
pub const MIN_OPPORTUNITY_POPULATION: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsState {
    pub code: &'static str,
    pub name: &'static str,
    pub fips: &'static str,
}

const STATES: &[UsState] = &[
    UsState { code: "AL", name: "Alabama", fips: "01" },
    UsState { code: "AK", name: "Alaska", fips: "02" },
    UsState { code: "AZ", name: "Arizona", fips: "04" },
    UsState { code: "AR", name: "Arkansas", fips: "05" },
    UsState { code: "CA", name: "California", fips: "06" },
    UsState { code: "CO", name: "Colorado", fips: "08" },
    UsState { code: "CT", name: "Connecticut", fips: "09" },
    UsState { code: "DE", name: "Delaware", fips: "10" },
    UsState { code: "DC", name: "District of Columbia", fips: "11" },
    UsState { code: "FL", name: "Florida", fips: "12" },
    UsState { code: "GA", name: "Georgia", fips: "13" },
    UsState { code: "HI", name: "Hawaii", fips: "15" },
    UsState { code: "ID", name: "Idaho", fips: "16" },
    UsState { code: "IL", name: "Illinois", fips: "17" },
    UsState { code: "IN", name: "Indiana", fips: "18" },
    UsState { code: "IA", name: "Iowa", fips: "19" },
    UsState { code: "KS", name: "Kansas", fips: "20" },
    UsState { code: "KY", name: "Kentucky", fips: "21" },
    UsState { code: "LA", name: "Louisiana", fips: "22" },
    UsState { code: "ME", name: "Maine", fips: "23" },
    UsState { code: "MD", name: "Maryland", fips: "24" },
    UsState { code: "MA", name: "Massachusetts", fips: "25" },
    UsState { code: "MI", name: "Michigan", fips: "26" },
    UsState { code: "MN", name: "Minnesota", fips: "27" },
    UsState { code: "MS", name: "Mississippi", fips: "28" },
    UsState { code: "MO", name: "Missouri", fips: "29" },
    UsState { code: "MT", name: "Montana", fips: "30" },
    UsState { code: "NE", name: "Nebraska", fips: "31" },
    UsState { code: "NV", name: "Nevada", fips: "32" },
    UsState { code: "NH", name: "New Hampshire", fips: "33" },
    UsState { code: "NJ", name: "New Jersey", fips: "34" },
    UsState { code: "NM", name: "New Mexico", fips: "35" },
    UsState { code: "NY", name: "New York", fips: "36" },
    UsState { code: "NC", name: "North Carolina", fips: "37" },
    UsState { code: "ND", name: "North Dakota", fips: "38" },
    UsState { code: "OH", name: "Ohio", fips: "39" },
    UsState { code: "OK", name: "Oklahoma", fips: "40" },
    UsState { code: "OR", name: "Oregon", fips: "41" },
    UsState { code: "PA", name: "Pennsylvania", fips: "42" },
    UsState { code: "RI", name: "Rhode Island", fips: "44" },
    UsState { code: "SC", name: "South Carolina", fips: "45" },
    UsState { code: "SD", name: "South Dakota", fips: "46" },
    UsState { code: "TN", name: "Tennessee", fips: "47" },
    UsState { code: "TX", name: "Texas", fips: "48" },
    UsState { code: "UT", name: "Utah", fips: "49" },
    UsState { code: "VT", name: "Vermont", fips: "50" },
    UsState { code: "VA", name: "Virginia", fips: "51" },
    UsState { code: "WA", name: "Washington", fips: "53" },
    UsState { code: "WV", name: "West Virginia", fips: "54" },
    UsState { code: "WI", name: "Wisconsin", fips: "55" },
    UsState { code: "WY", name: "Wyoming", fips: "56" },
    UsState { code: "PR", name: "Puerto Rico", fips: "72" },
];

/// Accepts a USPS code ("CA") or a full state name ("california").
pub fn resolve_state(state: &str) -> Option<&'static UsState> {
    let needle = normalize(state);
    STATES
        .iter()
        .find(|s| s.code.eq_ignore_ascii_case(&needle) || normalize(s.name) == needle)
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '.' || c == ',')
        .to_lowercase()
}

const PLACE_SUFFIXES: &[&str] = &[
    " city and borough",
    " unified government",
    " metropolitan government",
    " consolidated government",
    " urban county",
    " municipality",
    " borough",
    " village",
    " city",
    " town",
    " cdp",
];

/// "Los Angeles city, California" -> "los angeles city"
fn census_place(census_name: &str) -> String {
    let without_state = census_name
        .rsplit_once(", ")
        .map(|(place, _)| place)
        .unwrap_or(census_name);
    let name = normalize(without_state);
    match name.strip_suffix(" (balance)") {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

/// "Los Angeles city, California" -> "los angeles"
pub fn normalize_place_name(census_name: &str) -> String {
    let name = census_place(census_name);
    PLACE_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .map(str::to_string)
        .unwrap_or(name)
}

/// Census rows match on the bare place name or the name with its type word,
/// so "Kansas City" finds "Kansas City city, Missouri".
fn place_matches(census_name: &str, wanted: &str) -> bool {
    census_place(census_name) == wanted || normalize_place_name(census_name) == wanted
}

/// Pick the population for `city` out of `(census name, population)` rows.
///
/// No match is `NotFound`; several matches that disagree are `Unknown`.
pub fn match_population(rows: &[(String, u64)], city: &str) -> Result<Population, ToolError> {
    let wanted = census_place(city);
    let matches: Vec<u64> = rows
        .iter()
        .filter(|(name, _)| place_matches(name, &wanted))
        .map(|(_, population)| *population)
        .collect();

    match matches.as_slice() {
        [] => Err(ToolError::NotFound(format!("No place named '{}'", city.trim()))),
        [first, rest @ ..] if rest.iter().all(|p| p == first) => Ok(Population::Known(*first)),
        _ => Ok(Population::Unknown),
    }
}

#[async_trait]
pub trait PopulationSource: Send + Sync {
    async fn lookup(&self, city: &str, state: &str) -> Result<PopulationRecord, ToolError>;
}

/// Population counts from the 2020 decennial census (PL 94-171 table P1).
pub struct CensusPopulationSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl CensusPopulationSource {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
        })
    }

    async fn fetch_places(&self, state: &UsState) -> Result<Vec<(String, u64)>, ToolError> {
        let url = format!("{}/data/2020/dec/pl", self.base_url);
        let mut params = vec![
            ("get", "NAME,P1_001N".to_string()),
            ("for", "place:*".to_string()),
            ("in", format!("state:{}", state.fips)),
        ];
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }
        let (client, url, params) = (&self.client, url.as_str(), params.as_slice());

        let table = with_retry(&self.retry, "census population lookup", || async move {
            let response = client.get(url).query(params).send().await?;
            let response = check_status(response).await?;
            Ok::<_, ToolError>(response.json::<Vec<Vec<String>>>().await?)
        })
        .await?;

        parse_census_table(&table)
    }
}

fn parse_census_table(table: &[Vec<String>]) -> Result<Vec<(String, u64)>, ToolError> {
    let (header, rows) = table
        .split_first()
        .ok_or_else(|| ToolError::InvalidResponse("Empty census response".to_string()))?;

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ToolError::InvalidResponse(format!("Census response lacks {}", name)))
    };
    let name_idx = column("NAME")?;
    let pop_idx = column("P1_001N")?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let name = row.get(name_idx)?;
            let population = row.get(pop_idx)?.parse::<u64>().ok()?;
            Some((name.clone(), population))
        })
        .collect())
}

#[async_trait]
impl PopulationSource for CensusPopulationSource {
    async fn lookup(&self, city: &str, state: &str) -> Result<PopulationRecord, ToolError> {
        let us_state = resolve_state(state)
            .ok_or_else(|| ToolError::NotFound(format!("Unknown state '{}'", state.trim())))?;

        let places = self.fetch_places(us_state).await?;
        let population = match_population(&places, city)?;

        Ok(PopulationRecord {
            city: city.trim().to_string(),
            state: us_state.code.to_string(),
            population,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rows(data: &[(&str, u64)]) -> Vec<(String, u64)> {
        data.iter().map(|(n, p)| (n.to_string(), *p)).collect()
    }

    #[test]
    fn test_resolve_state_by_code_and_name() {
        assert_eq!(resolve_state("ca").unwrap().fips, "06");
        assert_eq!(resolve_state(" New York ").unwrap().code, "NY");
        assert!(resolve_state("Atlantis").is_none());
    }

    #[test]
    fn test_normalize_place_name() {
        assert_eq!(normalize_place_name("Los Angeles city, California"), "los angeles");
        assert_eq!(normalize_place_name("East Los Angeles CDP, California"), "east los angeles");
        assert_eq!(
            normalize_place_name("Nashville-Davidson metropolitan government (balance), Tennessee"),
            "nashville-davidson"
        );
        assert_eq!(normalize_place_name("Los Angeles"), "los angeles");
    }

    #[test]
    fn test_match_population() {
        let table = rows(&[
            ("Los Angeles city, California", 3_898_747),
            ("East Los Angeles CDP, California", 118_786),
        ]);
        assert_eq!(
            match_population(&table, "Los Angeles").unwrap(),
            Population::Known(3_898_747)
        );
        assert!(matches!(
            match_population(&table, "Gotham"),
            Err(ToolError::NotFound(_))
        ));
    }

    #[test]
    fn test_city_named_places() {
        let missouri = rows(&[
            ("Kansas City city, Missouri", 508_090),
            ("Kearney city, Missouri", 10_404),
        ]);
        assert_eq!(
            match_population(&missouri, "Kansas City").unwrap(),
            Population::Known(508_090)
        );

        let new_jersey = rows(&[
            ("Jersey City city, New Jersey", 292_449),
            ("Newark city, New Jersey", 311_549),
        ]);
        assert_eq!(
            match_population(&new_jersey, "Jersey City").unwrap(),
            Population::Known(292_449)
        );
        assert_eq!(
            match_population(&new_jersey, "Newark").unwrap(),
            Population::Known(311_549)
        );

        let nevada = rows(&[("Carson City, Nevada", 58_639)]);
        assert_eq!(
            match_population(&nevada, "Carson City").unwrap(),
            Population::Known(58_639)
        );
    }

    #[test]
    fn test_ambiguous_match_is_unknown() {
        let table = rows(&[
            ("Springfield city, Ohio", 58_662),
            ("Springfield village, Ohio", 1_200),
        ]);
        assert_eq!(match_population(&table, "Springfield").unwrap(), Population::Unknown);
    }

    #[tokio::test]
    async fn test_census_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2020/dec/pl"))
            .and(query_param("in", "state:06"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                ["NAME", "P1_001N", "state", "place"],
                ["Los Angeles city, California", "3898747", "06", "44000"],
                ["Malibu city, California", "10654", "06", "45246"]
            ])))
            .mount(&server)
            .await;

        let source = CensusPopulationSource::new(
            server.uri(),
            None,
            Duration::from_secs(5),
            RetryPolicy::immediate(0),
        )
        .unwrap();

        let record = source.lookup("Los Angeles", "CA").await.unwrap();
        assert_eq!(record.state, "CA");
        assert!(record.population.count().unwrap() > MIN_OPPORTUNITY_POPULATION);

        let missing = source.lookup("Atlantis", "California").await;
        assert!(matches!(missing, Err(ToolError::NotFound(_))));
    }
}
