use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::ToolError;
use crate::models::{CompetitorCandidate, DistanceQuery, Location, Population};
use crate::services::geo::{DistanceCalculator, HttpGeocoder};
use crate::services::population::{CensusPopulationSource, PopulationSource, MIN_OPPORTUNITY_POPULATION};
use crate::services::retry::RetryPolicy;
use crate::services::search::{SearchProvider, SerperSearch, DEFAULT_RESULTS};
use crate::services::verifier::CompetitorVerifier;

pub const WEB_SEARCH: &str = "web_search";
pub const DISTANCE_CALCULATOR: &str = "distance_calculator";
pub const POPULATION_LOOKUP: &str = "population_lookup";
pub const COMPETITOR_VERIFIER: &str = "competitor_verifier";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(
        &self,
        arguments: Value,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Definitions ordered by name so prompts are stable between runs.
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// A registry holding only the named tools. Names that are not
    /// registered (e.g. search without an API key) are skipped.
    pub fn subset(&self, names: &[&str]) -> ToolRegistry {
        let mut subset = ToolRegistry::new();
        for name in names {
            match self.get(name) {
                Some(tool) => subset.register(tool),
                None => log::warn!("Tool '{}' is not available, skipping", name),
            }
        }
        subset
    }
}

fn required_str<'a>(arguments: &'a Value, field: &str) -> Result<&'a str, String> {
    arguments[field]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing {}", field))
}

// Web Search Tool
pub struct WebSearchTool {
    search: Arc<dyn SearchProvider>,
}

impl WebSearchTool {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH
    }

    fn description(&self) -> &str {
        "Search the web. Returns the top results with title, link and snippet. Use it to find dealership details, competitors and nearby cities."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 10, max 20)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: Value,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let query = required_str(&arguments, "query")?;
        let num_results = arguments["num_results"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_RESULTS);

        let results = self.search.search(query, num_results).await?;

        Ok(serde_json::json!({
            "results": results,
            "count": results.len()
        }))
    }
}

// Distance Calculator Tool
pub struct DistanceCalculatorTool {
    calculator: Arc<DistanceCalculator>,
}

impl DistanceCalculatorTool {
    pub fn new(calculator: Arc<DistanceCalculator>) -> Self {
        Self { calculator }
    }
}

#[async_trait]
impl Tool for DistanceCalculatorTool {
    fn name(&self) -> &str {
        DISTANCE_CALCULATOR
    }

    fn description(&self) -> &str {
        "Great-circle distance in miles between two places. Each place may be a US zipcode, a street address, or 'latitude, longitude'."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "origin": {
                    "type": "string",
                    "description": "First place: zipcode, address, or 'lat, lon'"
                },
                "destination": {
                    "type": "string",
                    "description": "Second place: zipcode, address, or 'lat, lon'"
                }
            },
            "required": ["origin", "destination"]
        })
    }

    async fn execute(
        &self,
        arguments: Value,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let origin = required_str(&arguments, "origin")?;
        let destination = required_str(&arguments, "destination")?;

        let parse = |value: &str, role: &str| {
            Location::parse(value).ok_or_else(|| {
                ToolError::InvalidArgument(format!("{} '{}' is not a valid location", role, value))
            })
        };
        let outcome = match (parse(origin, "origin"), parse(destination, "destination")) {
            (Ok(origin), Ok(destination)) => {
                self.calculator
                    .distance(&DistanceQuery { origin, destination })
                    .await
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        match outcome {
            Ok(result) => Ok(serde_json::json!({
                "status": "ok",
                "miles": (result.miles * 100.0).round() / 100.0,
                "origin": result.origin,
                "destination": result.destination
            })),
            Err(e) => {
                log::warn!("Distance lookup failed for {} -> {}: {}", origin, destination, e);
                Ok(serde_json::json!({
                    "status": "unknown",
                    "origin": origin,
                    "destination": destination,
                    "error": e.to_string()
                }))
            }
        }
    }
}

// Population Lookup Tool
pub struct PopulationDataTool {
    source: Arc<dyn PopulationSource>,
}

impl PopulationDataTool {
    pub fn new(source: Arc<dyn PopulationSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for PopulationDataTool {
    fn name(&self) -> &str {
        POPULATION_LOOKUP
    }

    fn description(&self) -> &str {
        "Population of a US city or town from the 2020 census. Returns 'unknown' when the place cannot be identified."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City or town name"
                },
                "state": {
                    "type": "string",
                    "description": "Two-letter state code or full state name"
                }
            },
            "required": ["city", "state"]
        })
    }

    async fn execute(
        &self,
        arguments: Value,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let city = required_str(&arguments, "city")?;
        let state = required_str(&arguments, "state")?;

        let unknown = |reason: String| {
            serde_json::json!({
                "status": "unknown",
                "city": city,
                "state": state,
                "population": "unknown",
                "reason": reason
            })
        };

        match self.source.lookup(city, state).await {
            Ok(record) => match record.population {
                Population::Known(count) => Ok(serde_json::json!({
                    "status": "ok",
                    "city": record.city,
                    "state": record.state,
                    "population": count,
                    "meets_threshold": count > MIN_OPPORTUNITY_POPULATION
                })),
                Population::Unknown => Ok(unknown(format!(
                    "Several places named '{}' in {} with different populations",
                    city, record.state
                ))),
            },
            Err(e) => {
                log::warn!("Population lookup failed for {}, {}: {}", city, state, e);
                Ok(unknown(e.to_string()))
            }
        }
    }
}

// Competitor Verifier Tool
pub struct CompetitorVerifierTool {
    verifier: Arc<CompetitorVerifier>,
}

impl CompetitorVerifierTool {
    pub fn new(verifier: Arc<CompetitorVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl Tool for CompetitorVerifierTool {
    fn name(&self) -> &str {
        COMPETITOR_VERIFIER
    }

    fn description(&self) -> &str {
        "Check that a competitor dealership exists and sells the claimed brand by inspecting its website. Returns a verdict (valid, invalid, uncertain) with evidence."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Dealership name"
                },
                "website": {
                    "type": "string",
                    "description": "Dealership website URL"
                },
                "oem": {
                    "type": "string",
                    "description": "Brand the dealership is claimed to sell"
                },
                "address": {
                    "type": "string",
                    "description": "Street address, if known"
                }
            },
            "required": ["name", "website", "oem"]
        })
    }

    async fn execute(
        &self,
        arguments: Value,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let candidate = CompetitorCandidate {
            name: required_str(&arguments, "name")?.to_string(),
            website: required_str(&arguments, "website")?.to_string(),
            oem: required_str(&arguments, "oem")?.to_string(),
            address: arguments["address"].as_str().map(str::to_string),
        };

        let report = self.verifier.verify(candidate).await;
        Ok(serde_json::to_value(report)?)
    }
}

/// Wire every tool against the services configured in `config`.
/// Web search is only available when a Serper API key is set.
pub fn build_tool_registry(config: &Config) -> Result<ToolRegistry, ToolError> {
    let timeout = Duration::from_secs(config.http_timeout_secs);
    let retry = RetryPolicy::new(config.http_max_retries);

    let search: Option<Arc<dyn SearchProvider>> = match &config.serper_api_key {
        Some(key) => Some(Arc::new(SerperSearch::new(
            config.serper_api_url.clone(),
            key.clone(),
            timeout,
            retry,
        )?)),
        None => {
            log::warn!("SERPER_API_KEY not set; web search is disabled");
            None
        }
    };

    let geocoder = HttpGeocoder::new(
        config.zipcode_api_url.clone(),
        config.geocoder_api_url.clone(),
        timeout,
        retry,
    )?;
    let population = CensusPopulationSource::new(
        config.census_api_url.clone(),
        config.census_api_key.clone(),
        timeout,
        retry,
    )?;
    let verifier = CompetitorVerifier::new(search.clone(), timeout, retry)?;

    let mut registry = ToolRegistry::new();
    if let Some(search) = search {
        registry.register(Arc::new(WebSearchTool::new(search)));
    }
    registry.register(Arc::new(DistanceCalculatorTool::new(Arc::new(
        DistanceCalculator::new(Arc::new(geocoder)),
    ))));
    registry.register(Arc::new(PopulationDataTool::new(Arc::new(population))));
    registry.register(Arc::new(CompetitorVerifierTool::new(Arc::new(verifier))));

    Ok(registry)
}
