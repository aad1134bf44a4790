use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::ToolError;
use crate::models::{CompetitorCandidate, Verdict, VerificationReport};
use crate::services::retry::{check_status, with_retry, RetryPolicy};
use crate::services::search::SearchProvider;
use crate::utils::sanitize::{contains_phrase, normalize_text, page_text, page_title};

/// Words that say nothing about which dealership a name refers to.
const GENERIC_NAME_WORDS: &[&str] = &[
    "the", "and", "of", "inc", "llc", "ltd", "co", "company", "group", "auto", "autos",
    "automotive", "motor", "motors", "car", "cars", "dealer", "dealers", "dealership",
    "sales", "center", "centre", "superstore", "new", "used",
];

/// Alternate spellings a brand is commonly advertised under.
const OEM_ALIASES: &[(&str, &[&str])] = &[
    ("chevrolet", &["chevy"]),
    ("volkswagen", &["vw"]),
    ("mercedes-benz", &["mercedes", "mercedes benz"]),
    ("mercedes", &["mercedes-benz"]),
    ("ram", &["ram trucks"]),
    ("gmc", &["gmc trucks"]),
    ("mini", &["mini cooper"]),
    ("land rover", &["range rover"]),
    ("alfa romeo", &["alfa"]),
];

pub fn oem_names(oem: &str) -> Vec<String> {
    let primary = oem.trim().to_lowercase();
    let mut names = vec![primary.clone()];
    for (brand, aliases) in OEM_ALIASES {
        if *brand == primary {
            names.extend(aliases.iter().map(|a| a.to_string()));
        }
    }
    names
}

/// Lowercased tokens of the dealership name that identify it, with generic
/// words and the brand itself removed. Falls back to every token of length
/// three or more when nothing distinctive is left.
pub fn significant_name_tokens(name: &str, oem: &str) -> Vec<String> {
    let oem_tokens: Vec<String> = oem_names(oem)
        .iter()
        .flat_map(|n| n.split(|c: char| !c.is_alphanumeric()).map(str::to_string).collect::<Vec<_>>())
        .collect();

    let all: Vec<String> = name
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= 3)
        .collect();

    let distinctive: Vec<String> = all
        .iter()
        .filter(|t| !GENERIC_NAME_WORDS.contains(&t.as_str()) && !oem_tokens.contains(t))
        .cloned()
        .collect();

    if distinctive.is_empty() {
        all
    } else {
        distinctive
    }
}

/// Facts gathered about one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    pub oem_on_site: bool,
    pub name_on_site: bool,
    pub name_in_domain: bool,
    pub oem_in_search: Option<bool>,
}

impl Evidence {
    pub fn oem_confirmed(&self) -> bool {
        self.oem_on_site || self.oem_in_search == Some(true)
    }

    pub fn name_confirmed(&self) -> bool {
        self.name_on_site || self.name_in_domain
    }
}

/// Verdict for a reachable website.
pub fn decide(evidence: &Evidence) -> Verdict {
    match (evidence.oem_confirmed(), evidence.name_confirmed()) {
        (true, true) => Verdict::Valid,
        (false, false) => Verdict::Invalid,
        _ => Verdict::Uncertain,
    }
}

fn host_of(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_lowercase())
}

pub fn normalize_website(website: &str) -> Option<Url> {
    let trimmed = website.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    Url::parse(&with_scheme)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

/// Best-effort check that a competitor exists and sells the claimed brand.
/// Never fails: network trouble is reported as an `uncertain` verdict.
pub struct CompetitorVerifier {
    client: reqwest::Client,
    search: Option<Arc<dyn SearchProvider>>,
    retry: RetryPolicy,
}

impl CompetitorVerifier {
    pub fn new(
        search: Option<Arc<dyn SearchProvider>>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("Mozilla/5.0 (compatible; dealer-insights-backend/", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;
        Ok(Self { client, search, retry })
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, ToolError> {
        let client = &self.client;
        with_retry(&self.retry, "website verification", || async move {
            let response = client.get(url.clone()).send().await?;
            let response = check_status(response).await?;
            Ok::<_, ToolError>(response.text().await?)
        })
        .await
    }

    async fn search_confirms_oem(
        &self,
        search: &dyn SearchProvider,
        candidate: &CompetitorCandidate,
        host: &str,
    ) -> Result<bool, ToolError> {
        let query = format!("{} {} dealership", candidate.name.trim(), candidate.oem.trim());
        let results = search.search(&query, 10).await?;
        let brands = oem_names(&candidate.oem);

        Ok(results.iter().any(|r| {
            let same_host = Url::parse(&r.link)
                .ok()
                .and_then(|u| host_of(&u))
                .map(|h| h == host)
                .unwrap_or(false);
            let text = normalize_text(&format!("{} {}", r.title, r.snippet));
            same_host && brands.iter().any(|b| contains_phrase(&text, b))
        }))
    }

    pub async fn verify(&self, candidate: CompetitorCandidate) -> VerificationReport {
        let mut evidence_log = Vec::new();

        let url = match normalize_website(&candidate.website) {
            Some(url) => url,
            None => {
                evidence_log.push(format!("website '{}' is not a valid URL", candidate.website));
                return VerificationReport { candidate, verdict: Verdict::Invalid, evidence: evidence_log };
            }
        };
        let host = host_of(&url).unwrap_or_default();

        let html = match self.fetch_page(&url).await {
            Ok(html) => {
                evidence_log.push(format!("website {} is reachable", url));
                html
            }
            Err(ToolError::Status { status, .. }) if status == 404 || status == 410 => {
                evidence_log.push(format!("website {} returned HTTP {}", url, status));
                return VerificationReport { candidate, verdict: Verdict::Invalid, evidence: evidence_log };
            }
            Err(e) => {
                log::warn!("Could not verify {}: {}", url, e);
                evidence_log.push(format!("website {} unreachable: {}", url, e));
                return VerificationReport { candidate, verdict: Verdict::Uncertain, evidence: evidence_log };
            }
        };

        let text = page_text(&html);
        let title = page_title(&html);
        let brands = oem_names(&candidate.oem);
        let tokens = significant_name_tokens(&candidate.name, &candidate.oem);

        let mut evidence = Evidence {
            oem_on_site: brands.iter().any(|b| contains_phrase(&text, b)),
            ..Evidence::default()
        };

        let title_has_name = title
            .as_deref()
            .map(|t| contains_phrase(t, &candidate.name))
            .unwrap_or(false);
        let tokens_found = tokens.iter().filter(|t| contains_phrase(&text, t)).count();
        let tokens_needed = tokens.len().div_ceil(2).max(1);
        evidence.name_on_site = title_has_name || (!tokens.is_empty() && tokens_found >= tokens_needed);

        let compact_host = host.replace(['-', '.'], "");
        evidence.name_in_domain = tokens.iter().any(|t| compact_host.contains(t.as_str()));

        if evidence.oem_on_site {
            evidence_log.push(format!("site mentions {}", candidate.oem.trim()));
        } else {
            evidence_log.push(format!("site does not mention {}", candidate.oem.trim()));
            if let Some(search) = &self.search {
                match self.search_confirms_oem(search.as_ref(), &candidate, &host).await {
                    Ok(found) => {
                        evidence.oem_in_search = Some(found);
                        evidence_log.push(if found {
                            format!("search results from {} mention {}", host, candidate.oem.trim())
                        } else {
                            format!("no search result from {} mentions {}", host, candidate.oem.trim())
                        });
                    }
                    Err(e) => {
                        log::warn!("Search check failed for {}: {}", candidate.name, e);
                        evidence_log.push(format!("search check failed: {}", e));
                    }
                }
            }
        }

        evidence_log.push(if evidence.name_on_site {
            format!("site content matches the name '{}'", candidate.name.trim())
        } else {
            format!("site content does not match the name '{}'", candidate.name.trim())
        });
        if evidence.name_in_domain {
            evidence_log.push(format!("domain {} matches the name", host));
        }

        let verdict = decide(&evidence);
        log::info!("Verified {} ({}): {:?}", candidate.name, url, verdict);

        VerificationReport { candidate, verdict, evidence: evidence_log }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::search::SearchResult;
    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedSearch(Vec<SearchResult>);

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _query: &str, _num: usize) -> Result<Vec<SearchResult>, ToolError> {
            Ok(self.0.clone())
        }
    }

    fn verifier(search: Option<Arc<dyn SearchProvider>>) -> CompetitorVerifier {
        CompetitorVerifier::new(search, Duration::from_secs(5), RetryPolicy::immediate(1)).unwrap()
    }

    fn candidate(website: String, oem: &str) -> CompetitorCandidate {
        CompetitorCandidate {
            name: "Sunset Toyota".to_string(),
            website,
            oem: oem.to_string(),
            address: None,
        }
    }

    #[test]
    fn test_significant_tokens_drop_brand_and_generic_words() {
        assert_eq!(significant_name_tokens("Sunset Toyota Motors", "Toyota"), vec!["sunset"]);
        assert_eq!(significant_name_tokens("Toyota Motors", "Toyota"), vec!["toyota", "motors"]);
    }

    #[test]
    fn test_oem_aliases() {
        let names = oem_names("Chevrolet");
        assert!(names.contains(&"chevy".to_string()));
    }

    #[test]
    fn test_decide() {
        let both = Evidence { oem_on_site: true, name_in_domain: true, ..Evidence::default() };
        assert_eq!(decide(&both), Verdict::Valid);

        let oem_only = Evidence { oem_in_search: Some(true), ..Evidence::default() };
        assert_eq!(decide(&oem_only), Verdict::Uncertain);

        assert_eq!(decide(&Evidence::default()), Verdict::Invalid);
    }

    #[test]
    fn test_normalize_website() {
        assert_eq!(
            normalize_website("sunsettoyota.com").unwrap().as_str(),
            "https://sunsettoyota.com/"
        );
        assert!(normalize_website("ftp://example.com").is_none());
        assert!(normalize_website("not a website").is_none());
    }

    #[tokio::test]
    async fn test_valid_when_site_matches_name_and_oem() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><head><title>Sunset Toyota | New Toyota Cars</title></head>\
                 <body><h1>Welcome to Sunset Toyota</h1></body></html>",
            ))
            .mount(&server)
            .await;

        let report = verifier(None).verify(candidate(server.uri(), "Toyota")).await;
        assert_eq!(report.verdict, Verdict::Valid);
        assert!(!report.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_oem_is_uncertain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><h1>Sunset Honda</h1><p>Honda sales and service</p></body></html>",
            ))
            .mount(&server)
            .await;

        let mut c = candidate(server.uri(), "Toyota");
        c.name = "Sunset Honda".to_string();
        let report = verifier(None).verify(c).await;
        assert_eq!(report.verdict, Verdict::Uncertain);
    }

    #[tokio::test]
    async fn test_search_can_confirm_oem() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><h1>Sunset Motors</h1></body></html>",
            ))
            .mount(&server)
            .await;

        let search: Arc<dyn SearchProvider> = Arc::new(FixedSearch(vec![SearchResult {
            title: "Sunset Motors - Toyota Dealer".to_string(),
            link: format!("{}/inventory", server.uri()),
            snippet: "Shop new Toyota models".to_string(),
        }]));

        let mut c = candidate(server.uri(), "Toyota");
        c.name = "Sunset Motors".to_string();
        let report = verifier(Some(search)).verify(c).await;
        assert_eq!(report.verdict, Verdict::Valid);
    }

    #[tokio::test]
    async fn test_missing_page_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let report = verifier(None)
            .verify(candidate(format!("{}/gone", server.uri()), "Toyota"))
            .await;
        assert_eq!(report.verdict, Verdict::Invalid);
    }

    #[tokio::test]
    async fn test_unreachable_site_is_uncertain() {
        let report = verifier(None)
            .verify(candidate("http://127.0.0.1:1/".to_string(), "Toyota"))
            .await;
        assert_eq!(report.verdict, Verdict::Uncertain);
    }

    #[tokio::test]
    async fn test_invalid_url_is_invalid() {
        let report = verifier(None)
            .verify(candidate("not a website".to_string(), "Toyota"))
            .await;
        assert_eq!(report.verdict, Verdict::Invalid);
    }
}
