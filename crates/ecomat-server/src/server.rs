use std::io::{self, BufRead, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;

use ecomat_core::{
    compute_sustainability, explain_composition, find_best, parse_requirements,
    recommend_for_part, Dataset, PropertyTargets, SimilarityConfig, SimilarityRanker,
    SustainabilityConfig, DEFAULT_PART_TOP_N,
};
use ecomat_dataset::{
    available_properties, dataset_from_value, impute_numeric_means, load_dataset, DatasetError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::protocol::{
    AvailablePropertiesResponse, ErrorBody, FindAlloyResponse, PartNameRequest, RecommendRequest,
    SustainabilityRequest, SustainabilityResponse,
};

pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_DATASET_PATH: &str = "data/recommendation_dataset.json";
const MAX_BODY_BYTES: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub dataset_path: PathBuf,
    pub alloy_dataset_path: Option<PathBuf>,
    pub impute_means: bool,
    pub similarity: SimilarityConfig,
    pub sustainability: SustainabilityConfig,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            alloy_dataset_path: None,
            impute_means: false,
            similarity: SimilarityConfig::default(),
            sustainability: SustainabilityConfig::default(),
        }
    }
}

impl AdvisorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let dataset_path = env_path("ECOMAT_DATASET").unwrap_or(defaults.dataset_path);
        let alloy_dataset_path = env_path("ECOMAT_ALLOY_DATASET");
        let impute_means = std::env::var("ECOMAT_IMPUTE_MEANS")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let similarity = SimilarityConfig {
            default_threshold: env_f64(
                "ECOMAT_DEFAULT_THRESHOLD",
                defaults.similarity.default_threshold,
                0.0,
                1.0,
            ),
            overall_floor: env_f64(
                "ECOMAT_OVERALL_FLOOR",
                defaults.similarity.overall_floor,
                0.0,
                1.0,
            ),
            ..defaults.similarity
        };
        let sustainability = SustainabilityConfig {
            decay: env_f64(
                "ECOMAT_SUSTAINABILITY_K",
                defaults.sustainability.decay,
                0.0,
                10.0,
            ),
            ..defaults.sustainability
        };

        Self {
            dataset_path,
            alloy_dataset_path,
            impute_means,
            similarity,
            sustainability,
        }
    }
}

/// Serves the advisor endpoints over a read-only, load-once dataset pair:
/// `materials` backs similarity, part and sustainability lookups, `alloys`
/// backs range matching and property listing.
pub struct AdvisorServer {
    materials: Arc<Dataset>,
    alloys: Arc<Dataset>,
    ranker: SimilarityRanker,
    sustainability: SustainabilityConfig,
}

impl AdvisorServer {
    pub fn from_config(config: AdvisorConfig) -> Result<Self, DatasetError> {
        let mut materials = load_dataset(&config.dataset_path)?;
        if config.impute_means {
            materials = impute_numeric_means(&materials);
            log::info!("imputed missing numeric values with column means");
        }

        let alloys = match &config.alloy_dataset_path {
            None => materials.clone(),
            Some(path) => load_dataset(path).unwrap_or_else(|err| {
                log::error!(
                    "failed to load alloy dataset {}: {err}; serving an empty alloy list",
                    path.display()
                );
                Dataset::default()
            }),
        };

        Ok(Self::with_datasets(
            materials,
            alloys,
            config.similarity,
            config.sustainability,
        ))
    }

    pub fn with_datasets(
        materials: Dataset,
        alloys: Dataset,
        similarity: SimilarityConfig,
        sustainability: SustainabilityConfig,
    ) -> Self {
        Self {
            materials: Arc::new(materials),
            alloys: Arc::new(alloys),
            ranker: SimilarityRanker::new(similarity),
            sustainability,
        }
    }

    pub fn serve_http(&self, addr: &str) -> io::Result<()> {
        let listener = TcpListener::bind(addr)?;
        log::info!("ecomat http listening on {}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(err) = self.handle_http_connection(stream) {
                        log::error!("http request error: {err}");
                    }
                }
                Err(err) => {
                    log::error!("http accept error: {err}");
                }
            }
        }
        Ok(())
    }

    fn handle_http_connection(&self, mut stream: TcpStream) -> io::Result<()> {
        let Some(req) = read_http_request(&stream)? else {
            return Ok(());
        };
        log::debug!("{} {}", req.method, req.path);
        let response = self.dispatch_http_request(&req);
        write_http_response(&mut stream, &response)
    }

    fn dispatch_http_request(&self, req: &HttpRequest) -> HttpResponse {
        if req.method == "OPTIONS" {
            return HttpResponse::empty(204);
        }

        let route = match req.path.as_str() {
            "/" => Route::Hello,
            "/health" => Route::Health,
            "/api/find-alloy" => Route::FindAlloy,
            "/api/available-properties" => Route::AvailableProperties,
            "/api/recommend" => Route::Recommend,
            "/api/part-name" => Route::PartName,
            "/api/sustainability" => Route::Sustainability,
            _ => {
                return HttpResponse::json(
                    404,
                    &ErrorBody::new("not_found").with_message(format!("no route for {}", req.path)),
                )
            }
        };

        if req.method != route.method() {
            return HttpResponse::json(
                405,
                &ErrorBody::new("method_not_allowed")
                    .with_message(format!("use {} {}", route.method(), req.path)),
            );
        }

        match route {
            Route::Hello => HttpResponse::json(200, &json!({"message": "Hello, world!"})),
            Route::Health => HttpResponse::json(200, &json!({"status": "ok"})),
            Route::FindAlloy => self.find_alloy(&req.body),
            Route::AvailableProperties => HttpResponse::json(
                200,
                &AvailablePropertiesResponse {
                    available_properties: available_properties(&self.alloys),
                },
            ),
            Route::Recommend => self.recommend(&req.body),
            Route::PartName => self.part_name(&req.body),
            Route::Sustainability => self.sustainability(&req.body),
        }
    }

    fn find_alloy(&self, body: &[u8]) -> HttpResponse {
        let raw = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) if !map.is_empty() => map,
            Ok(_) => {
                log::warn!("find-alloy called without a requirement object");
                return HttpResponse::json(400, &ErrorBody::new("Invalid input"));
            }
            Err(err) => {
                return HttpResponse::json(
                    400,
                    &ErrorBody::new("Invalid input").with_message(err.to_string()),
                )
            }
        };

        let requirements = parse_requirements(&raw);
        let best = find_best(&self.alloys, &requirements);
        let Some(alloy) = best.material else {
            log::info!("no suitable alloy found for the given requirements");
            return HttpResponse::json(404, &ErrorBody::new("No suitable alloy found"));
        };

        HttpResponse::json(
            200,
            &FindAlloyResponse {
                alloy,
                score: best.score,
                composition_explanation: explain_composition(alloy),
            },
        )
    }

    fn recommend(&self, body: &[u8]) -> HttpResponse {
        let request: RecommendRequest = match parse_body(body) {
            Ok(v) => v,
            Err(response) => return response,
        };
        let targets = PropertyTargets::from_json(&request.properties);
        HttpResponse::json(200, &self.ranker.rank(&self.materials, &targets))
    }

    fn part_name(&self, body: &[u8]) -> HttpResponse {
        let request: PartNameRequest = match parse_body(body) {
            Ok(v) => v,
            Err(response) => return response,
        };
        let recommendations = recommend_for_part(
            &self.materials,
            request.part_name.trim(),
            DEFAULT_PART_TOP_N,
            &self.sustainability,
        );
        HttpResponse::json(200, &recommendations)
    }

    fn sustainability(&self, body: &[u8]) -> HttpResponse {
        let request: SustainabilityRequest = match parse_body(body) {
            Ok(v) => v,
            Err(response) => return response,
        };
        let scores = match request.materials {
            None => compute_sustainability(&self.materials, &self.sustainability),
            Some(raw) => match dataset_from_value(raw) {
                Ok(population) => compute_sustainability(&population, &self.sustainability),
                Err(err) => {
                    return HttpResponse::json(
                        400,
                        &ErrorBody::new("Invalid input").with_message(err.to_string()),
                    )
                }
            },
        };
        HttpResponse::json(200, &SustainabilityResponse { scores })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Hello,
    Health,
    FindAlloy,
    AvailableProperties,
    Recommend,
    PartName,
    Sustainability,
}

impl Route {
    fn method(self) -> &'static str {
        match self {
            Self::Hello | Self::Health | Self::AvailableProperties => "GET",
            Self::FindAlloy | Self::Recommend | Self::PartName | Self::Sustainability => "POST",
        }
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

#[derive(Debug)]
struct HttpResponse {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl HttpResponse {
    fn json<T: Serialize + ?Sized>(status: u16, payload: &T) -> Self {
        match serde_json::to_vec(payload) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(err) => {
                log::error!("failed to serialize response: {err}");
                Self {
                    status: 500,
                    content_type: "application/json",
                    body: br#"{"error":"Internal server error"}"#.to_vec(),
                }
            }
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
        }
    }
}

/// Empty bodies deserialize to `T::default()`.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, HttpResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| {
        HttpResponse::json(
            400,
            &ErrorBody::new("Invalid input").with_message(err.to_string()),
        )
    })
}

fn read_http_request(stream: &TcpStream) -> io::Result<Option<HttpRequest>> {
    let mut reader = io::BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let first = line.trim_end_matches(['\r', '\n']);
    if first.is_empty() {
        return Ok(None);
    }

    let mut parts = first.split_whitespace();
    let Some(method) = parts.next() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid http request line (missing method)",
        ));
    };
    let Some(target) = parts.next() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid http request line (missing path)",
        ));
    };
    let path = request_path(target);

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            break;
        }
        let header = header.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<usize>().unwrap_or(0);
            }
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("request body of {content_length} bytes exceeds {MAX_BODY_BYTES}"),
        ));
    }
    let mut body = vec![0_u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body)?;
    }
    Ok(Some(HttpRequest {
        method: method.to_ascii_uppercase(),
        path,
        body,
    }))
}

fn write_http_response(stream: &mut TcpStream, response: &HttpResponse) -> io::Result<()> {
    let headers = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nConnection: close\r\n\r\n",
        response.status,
        http_reason_phrase(response.status),
        response.content_type,
        response.body.len()
    );
    stream.write_all(headers.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()
}

fn http_reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

fn request_path(target: &str) -> String {
    target
        .split_once('?')
        .map_or(target, |(path, _query)| path)
        .to_string()
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_f64(name: &str, default: f64, min: f64, max: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecomat_dataset::dataset_from_value;

    fn server() -> AdvisorServer {
        let materials = dataset_from_value(json!({
            "materials": {
                "Polymer": {
                    "density": 1.4,
                    "recyclability": 70,
                    "sustainability_rating": 9,
                    "recommended_parts": ["Door Panel"]
                },
                "Steel": {
                    "density": 5.0,
                    "recyclability": 40,
                    "sustainability_rating": 6,
                    "recommended_parts": ["Door Panel", "Chassis"]
                }
            }
        }))
        .expect("materials");
        let alloys = dataset_from_value(json!([
            {"name": "A", "tensile_strength": 500, "composition": {"Fe": 98, "C": 2}},
            {"name": "B", "tensile_strength": 900}
        ]))
        .expect("alloys");
        AdvisorServer::with_datasets(
            materials,
            alloys,
            SimilarityConfig::default(),
            SustainabilityConfig::default(),
        )
    }

    fn request(method: &str, path: &str, body: &str) -> HttpRequest {
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn body_json(response: &HttpResponse) -> Value {
        serde_json::from_slice(&response.body).expect("json body")
    }

    #[test]
    fn find_alloy_returns_best_with_composition() {
        let resp = server().dispatch_http_request(&request(
            "POST",
            "/api/find-alloy",
            r#"{"tensile_strength":"400-600"}"#,
        ));
        assert_eq!(resp.status, 200);
        assert_eq!(
            body_json(&resp),
            json!({
                "alloy": {"name": "A", "tensile_strength": 500, "composition": {"Fe": 98, "C": 2}},
                "score": 1,
                "composition_explanation": {"Fe": "98%", "C": "2%"}
            })
        );
    }

    #[test]
    fn find_alloy_rejects_empty_or_invalid_input() {
        let srv = server();
        for body in ["{}", "", "[1,2]", "{broken"] {
            let resp = srv.dispatch_http_request(&request("POST", "/api/find-alloy", body));
            assert_eq!(resp.status, 400, "body {body:?}");
            assert_eq!(body_json(&resp)["error"], "Invalid input");
        }
    }

    #[test]
    fn find_alloy_without_alloys_is_not_found() {
        let srv = AdvisorServer::with_datasets(
            Dataset::default(),
            Dataset::default(),
            SimilarityConfig::default(),
            SustainabilityConfig::default(),
        );
        let resp = srv.dispatch_http_request(&request(
            "POST",
            "/api/find-alloy",
            r#"{"tensile_strength":"400-600"}"#,
        ));
        assert_eq!(resp.status, 404);
        assert_eq!(body_json(&resp), json!({"error": "No suitable alloy found"}));
    }

    #[test]
    fn recommend_ranks_and_falls_back_to_sentinel() {
        let srv = server();
        let resp = srv.dispatch_http_request(&request(
            "POST",
            "/api/recommend",
            r#"{"properties":{"density":1.4}}"#,
        ));
        assert_eq!(resp.status, 200);
        assert_eq!(
            body_json(&resp),
            json!([{"material": "Polymer", "similarity_score": 1.0}])
        );

        let resp = srv.dispatch_http_request(&request("POST", "/api/recommend", "{}"));
        assert_eq!(
            String::from_utf8_lossy(&resp.body),
            r#"[{"material":"No Material Found","similarity_score":0}]"#
        );
    }

    #[test]
    fn part_name_orders_by_rating() {
        let resp = server().dispatch_http_request(&request(
            "POST",
            "/api/part-name",
            r#"{"part_name":"Door Panel"}"#,
        ));
        assert_eq!(resp.status, 200);
        let body = body_json(&resp);
        let names: Vec<&str> = body
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|r| r["material"].as_str())
            .collect();
        assert_eq!(names, vec!["Polymer", "Steel"]);

        let resp = server().dispatch_http_request(&request("POST", "/api/part-name", ""));
        assert_eq!(body_json(&resp), json!([]));
    }

    #[test]
    fn sustainability_uses_body_population_when_given() {
        let srv = server();
        let resp = srv.dispatch_http_request(&request("POST", "/api/sustainability", ""));
        assert_eq!(
            body_json(&resp),
            json!({"scores": {"Polymer": 10.0, "Steel": 1.0}})
        );

        let resp = srv.dispatch_http_request(&request(
            "POST",
            "/api/sustainability",
            r#"{"materials":{"X":{"toxicity":3},"Y":{"toxicity":3}}}"#,
        ));
        assert_eq!(body_json(&resp), json!({"scores": {"X": 5.5, "Y": 5.5}}));

        let resp = srv.dispatch_http_request(&request(
            "POST",
            "/api/sustainability",
            r#"{"materials":42}"#,
        ));
        assert_eq!(resp.status, 400);
    }

    #[test]
    fn lists_alloy_properties() {
        let resp = server().dispatch_http_request(&request(
            "GET",
            "/api/available-properties",
            "",
        ));
        assert_eq!(
            body_json(&resp),
            json!({"available_properties": ["composition", "name", "tensile_strength"]})
        );
    }

    #[test]
    fn routing_errors_and_preflight() {
        let srv = server();
        assert_eq!(srv.dispatch_http_request(&request("GET", "/nope", "")).status, 404);
        assert_eq!(
            srv.dispatch_http_request(&request("GET", "/api/find-alloy", "")).status,
            405
        );
        assert_eq!(
            srv.dispatch_http_request(&request("OPTIONS", "/api/recommend", "")).status,
            204
        );
        let hello = srv.dispatch_http_request(&request("GET", "/", ""));
        assert_eq!(body_json(&hello), json!({"message": "Hello, world!"}));
    }

    #[test]
    fn strips_query_from_request_target() {
        assert_eq!(request_path("/api/recommend?debug=1&flag"), "/api/recommend");
        assert_eq!(request_path("/health"), "/health");
    }
}
