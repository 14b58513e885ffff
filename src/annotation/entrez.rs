//! Gene information lookup through NCBI Entrez E-utilities
//!
//! A lookup is two sequential requests: `esearch` resolves a gene name within
//! an organism to a Gene id, then `esummary` returns the record for that id.
//! The HTTP layer sits behind [`JsonTransport`] so lookups can be served by
//! any client, including an in-memory one in tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DiffExprError, Result};

/// Base URL of the E-utilities service
pub const ENTREZ_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues a GET request and decodes the JSON body.
///
/// Non-success statuses and transport failures are errors.
pub trait JsonTransport {
    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value>;
}

/// Blocking `reqwest` transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("diffexpr/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl JsonTransport for HttpTransport {
    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self.client.get(url).query(query).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiffExprError::Request {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json::<Value>()?)
    }
}

/// Summary record for one gene. Fields absent from the record are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneInfo {
    pub official_symbol: Option<String>,
    pub description: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub summary: Option<String>,
}

impl GeneInfo {
    fn from_summary(doc: &Value) -> Self {
        let field = |key: &str| {
            doc.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let aliases = field("otheraliases").map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        });

        Self {
            official_symbol: field("name"),
            description: field("description"),
            aliases,
            summary: field("summary"),
        }
    }
}

/// Looks up gene records by name and organism.
#[derive(Debug, Clone)]
pub struct GeneInfoFetcher<T: JsonTransport = HttpTransport> {
    transport: T,
    base_url: String,
}

impl GeneInfoFetcher<HttpTransport> {
    /// Fetcher against the public E-utilities endpoint
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new()?))
    }
}

impl<T: JsonTransport> GeneInfoFetcher<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            base_url: ENTREZ_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch the record for `gene_name` in `organism`.
    ///
    /// Returns `Ok(None)` when the search finds no matching gene id. Only the
    /// first id of the search is used.
    pub fn fetch(&self, gene_name: &str, organism: &str) -> Result<Option<GeneInfo>> {
        let search = self.transport.get_json(
            &format!("{}/esearch.fcgi", self.base_url),
            &[
                ("db", "gene".to_string()),
                ("term", format!("{}[Gene Name] AND {}[Organism]", gene_name, organism)),
                ("retmode", "json".to_string()),
            ],
        )?;

        let id_list = search
            .get("esearchresult")
            .and_then(|r| r.get("idlist"))
            .and_then(Value::as_array)
            .ok_or_else(|| DiffExprError::MalformedResponse {
                reason: "esearch response has no esearchresult.idlist".to_string(),
            })?;

        let gene_id = match id_list.first() {
            None => {
                log::debug!("No gene id found for {} in {}", gene_name, organism);
                return Ok(None);
            }
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            Some(other) => {
                return Err(DiffExprError::MalformedResponse {
                    reason: format!("unexpected gene id {}", other),
                })
            }
        };

        let summary = self.transport.get_json(
            &format!("{}/esummary.fcgi", self.base_url),
            &[
                ("db", "gene".to_string()),
                ("id", gene_id.clone()),
                ("retmode", "json".to_string()),
            ],
        )?;

        let doc = summary
            .get("result")
            .and_then(|r| r.get(&gene_id))
            .filter(|d| d.is_object())
            .ok_or_else(|| DiffExprError::MalformedResponse {
                reason: format!("esummary response has no record for gene id {}", gene_id),
            })?;

        Ok(Some(GeneInfo::from_summary(doc)))
    }

    /// Fetch several genes of one organism in order.
    ///
    /// Requests are issued one after another; the first failure aborts the
    /// batch.
    pub fn fetch_batch<S: AsRef<str>>(&self, gene_names: &[S], organism: &str) -> Result<Vec<Option<GeneInfo>>> {
        let infos = gene_names
            .iter()
            .map(|name| self.fetch(name.as_ref(), organism))
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "Fetched gene info for {}/{} genes in {}",
            infos.iter().filter(|i| i.is_some()).count(),
            gene_names.len(),
            organism
        );
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    /// Serves canned esearch/esummary bodies and records the requests.
    struct MockTransport {
        search: Value,
        summary: Value,
        fail_status: Option<u16>,
        calls: RefCell<Vec<(String, Vec<(String, String)>)>>,
    }

    impl MockTransport {
        fn new(search: Value, summary: Value) -> Self {
            Self {
                search,
                summary,
                fail_status: None,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl JsonTransport for MockTransport {
        fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
            self.calls.borrow_mut().push((
                url.to_string(),
                query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            ));
            if let Some(status) = self.fail_status {
                return Err(DiffExprError::Request {
                    url: url.to_string(),
                    status,
                });
            }
            if url.ends_with("esearch.fcgi") {
                Ok(self.search.clone())
            } else {
                Ok(self.summary.clone())
            }
        }
    }

    fn brca1_summary() -> Value {
        json!({
            "result": {
                "uids": ["672"],
                "672": {
                    "name": "BRCA1",
                    "description": "BRCA1 DNA repair associated",
                    "otheraliases": "BRCAI, BRCC1, FANCS",
                    "summary": "This gene encodes a nuclear phosphoprotein."
                }
            }
        })
    }

    #[test]
    fn test_fetch_found() {
        let transport = MockTransport::new(json!({"esearchresult": {"idlist": ["672", "999"]}}), brca1_summary());
        let fetcher = GeneInfoFetcher::with_transport(transport);
        let info = fetcher.fetch("BRCA1", "Homo sapiens").unwrap().unwrap();

        assert_eq!(info.official_symbol.as_deref(), Some("BRCA1"));
        assert_eq!(info.description.as_deref(), Some("BRCA1 DNA repair associated"));
        assert_eq!(
            info.aliases,
            Some(vec!["BRCAI".to_string(), "BRCC1".to_string(), "FANCS".to_string()])
        );
        assert!(info.summary.is_some());

        let calls = fetcher.transport.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, format!("{}/esearch.fcgi", ENTREZ_BASE_URL));
        assert!(calls[0]
            .1
            .contains(&("term".to_string(), "BRCA1[Gene Name] AND Homo sapiens[Organism]".to_string())));
        assert!(calls[1].1.contains(&("id".to_string(), "672".to_string())));
    }

    #[test]
    fn test_fetch_not_found_returns_none() {
        let transport = MockTransport::new(json!({"esearchresult": {"idlist": []}}), json!({}));
        let fetcher = GeneInfoFetcher::with_transport(transport);

        assert_eq!(fetcher.fetch("hox1", "Burkholderia stagnalis").unwrap(), None);
        // No summary request without an id
        assert_eq!(fetcher.transport.calls.borrow().len(), 1);
    }

    #[test]
    fn test_missing_fields_are_none() {
        let transport = MockTransport::new(
            json!({"esearchresult": {"idlist": ["42"]}}),
            json!({"result": {"42": {"name": "geneX", "otheraliases": ""}}}),
        );
        let info = GeneInfoFetcher::with_transport(transport)
            .fetch("geneX", "Mus musculus")
            .unwrap()
            .unwrap();
        assert_eq!(info.official_symbol.as_deref(), Some("geneX"));
        assert_eq!(info.description, None);
        assert_eq!(info.aliases, None);
        assert_eq!(info.summary, None);
    }

    #[test]
    fn test_http_failure_propagates() {
        let mut transport = MockTransport::new(json!({}), json!({}));
        transport.fail_status = Some(500);
        let err = GeneInfoFetcher::with_transport(transport)
            .fetch("BRCA1", "Homo sapiens")
            .unwrap_err();
        assert!(err.is_request_error());
        assert!(matches!(err, DiffExprError::Request { status: 500, .. }));
    }

    #[test]
    fn test_malformed_response() {
        let transport = MockTransport::new(json!({"error": "bad"}), json!({}));
        let err = GeneInfoFetcher::with_transport(transport)
            .fetch("BRCA1", "Homo sapiens")
            .unwrap_err();
        assert!(matches!(err, DiffExprError::MalformedResponse { .. }));
    }

    #[test]
    fn test_fetch_batch_keeps_order() {
        let transport = MockTransport::new(json!({"esearchresult": {"idlist": ["672"]}}), brca1_summary());
        let fetcher = GeneInfoFetcher::with_transport(transport).with_base_url("http://localhost:8080/eutils/");
        let infos = fetcher.fetch_batch(&["BRCA1", "BRCA1"][..], "Homo sapiens").unwrap();

        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|i| i.is_some()));
        assert_eq!(fetcher.transport.calls.borrow()[0].0, "http://localhost:8080/eutils/esearch.fcgi");
    }
}
