//! Low-noise vulnerability discovery.
//!
//! Detect mode has no injection marker: the scanner enumerates the
//! parameters of a request itself, then probes each with a quote
//! perturbation pair and concat-equivalence payloads. The whole budget is
//! a handful of requests per parameter, no attack payloads.

use crate::error::Result;
use crate::http::requester::{ProbeResponse, Requester};
use crate::http::template::RequestTemplate;
use crate::ui;
use url::form_urlencoded;

/// Where a parameter was found in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Url,
    BodyForm,
    BodyJson,
}

impl std::fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamLocation::Url => write!(f, "url"),
            ParamLocation::BodyForm => write!(f, "body-form"),
            ParamLocation::BodyJson => write!(f, "body-json"),
        }
    }
}

/// A parameter discovered in a request.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    pub location: ParamLocation,
    /// Dotted path for nested JSON parameters.
    pub path: String,
}

/// Outcome of probing one parameter.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub parameter: Parameter,
    pub vulnerable: bool,
    pub vuln_type: &'static str,
    pub details: String,
    pub working_payload: String,
}

const CONCAT_PAYLOADS: [(&str, &str); 5] = [
    ("in'||'fo", "Oracle/PostgreSQL"),
    ("in'+'fo", "MSSQL"),
    ("CONCAT('in','fo')", "MySQL"),
    ("'in'||'fo'", "Oracle/PostgreSQL (full)"),
    ("'in'+'fo'", "MSSQL (full)"),
];

pub struct Scanner<'a> {
    template: &'a RequestTemplate,
    requester: &'a mut Requester,
}

impl<'a> Scanner<'a> {
    pub fn new(template: &'a RequestTemplate, requester: &'a mut Requester) -> Self {
        Self { template, requester }
    }

    /// Enumerate URL query, form body, and JSON body parameters.
    pub fn discover_parameters(&self) -> Vec<Parameter> {
        let mut params = discover_url_parameters(self.template);
        params.extend(discover_body_parameters(self.template));
        params
    }

    /// Probe every discovered parameter.
    pub async fn scan_all(&mut self) -> Vec<ScanResult> {
        let params = self.discover_parameters();
        ui::info(format!("Discovered {} parameters to scan", params.len()));

        let mut results = Vec::new();
        for param in params {
            results.push(self.scan_parameter(param).await);
        }
        results
    }

    /// Probe one parameter: quote perturbation first, then a relevance
    /// check, then concat equivalence.
    pub async fn scan_parameter(&mut self, param: Parameter) -> ScanResult {
        let mut result = ScanResult {
            parameter: param,
            vulnerable: false,
            vuln_type: "",
            details: String::new(),
            working_payload: String::new(),
        };
        let param = result.parameter.clone();

        tracing::debug!("testing parameter: {} ({})", param.name, param.location);

        // A lone quote breaking the query while a doubled quote survives is
        // the classic error-based signal.
        let single = self.send_with_value(&param, &format!("{}'", param.value)).await;
        let double = self.send_with_value(&param, &format!("{}''", param.value)).await;
        if let (Some(single), Some(double)) = (&single, &double) {
            if !single.fingerprint.equals(&double.fingerprint) {
                result.vulnerable = true;
                result.vuln_type = "error-based";
                result.details = format!(
                    "Different responses for ' vs '' (status {} vs {})",
                    single.status, double.status
                );
                result.working_payload = format!("{}'", param.value);
                tracing::debug!("found error-based SQLi in {}", param.name);
                return result;
            }
        }

        // If two unrelated values fingerprint identically the parameter
        // never reaches a query; stop here.
        let original = self.send_with_value(&param, "info").await;
        let random = self.send_with_value(&param, "xxxx").await;
        let (Some(original), Some(random)) = (original, random) else {
            return result;
        };
        if original.fingerprint.equals(&random.fingerprint) {
            tracing::debug!("parameter {} does not affect the response", param.name);
            return result;
        }

        // String concatenation that reassembles "info" answering like the
        // plain value means the parameter is evaluated as SQL text.
        for (payload, engine_hint) in CONCAT_PAYLOADS {
            if let Some(resp) = self.send_with_value(&param, payload).await {
                if original.fingerprint.equals(&resp.fingerprint) {
                    result.vulnerable = true;
                    result.vuln_type = "concat-based";
                    result.details = format!("Concat payload matches original - {engine_hint}");
                    result.working_payload = payload.to_string();
                    tracing::debug!("found concat-based SQLi in {} ({engine_hint})", param.name);
                    return result;
                }
            }
        }

        result
    }

    async fn send_with_value(&mut self, param: &Parameter, value: &str) -> Option<ProbeResponse> {
        let raw = rewrite_parameter(self.template, param, value)?;
        match self.requester.send_raw(&raw).await {
            Ok(resp) => Some(resp),
            Err(e) => {
                tracing::debug!("probe failed: {e}");
                None
            }
        }
    }
}

fn discover_url_parameters(template: &RequestTemplate) -> Vec<Parameter> {
    let Some(idx) = template.path.find('?') else {
        return Vec::new();
    };

    form_urlencoded::parse(template.path[idx + 1..].as_bytes())
        .map(|(name, value)| Parameter {
            name: name.to_string(),
            value: value.to_string(),
            location: ParamLocation::Url,
            path: String::new(),
        })
        .collect()
}

fn discover_body_parameters(template: &RequestTemplate) -> Vec<Parameter> {
    if template.body.is_empty() {
        return Vec::new();
    }

    let content_type = template
        .header("content-type")
        .unwrap_or_default()
        .to_lowercase();

    if content_type.contains("application/json") {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&template.body) {
            let mut params = Vec::new();
            collect_json_parameters(&value, "", &mut params);
            return params;
        }
        return Vec::new();
    }

    if content_type.contains("application/x-www-form-urlencoded") {
        return form_urlencoded::parse(template.body.as_bytes())
            .map(|(name, value)| Parameter {
                name: name.to_string(),
                value: value.to_string(),
                location: ParamLocation::BodyForm,
                path: String::new(),
            })
            .collect();
    }

    Vec::new()
}

fn collect_json_parameters(value: &serde_json::Value, prefix: &str, out: &mut Vec<Parameter>) {
    let Some(map) = value.as_object() else {
        return;
    };
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            serde_json::Value::String(s) => out.push(Parameter {
                name: key.clone(),
                value: s.clone(),
                location: ParamLocation::BodyJson,
                path,
            }),
            serde_json::Value::Object(_) => collect_json_parameters(value, &path, out),
            _ => {}
        }
    }
}

/// Rebuild the raw request with one parameter set to `value`.
fn rewrite_parameter(template: &RequestTemplate, param: &Parameter, value: &str) -> Option<String> {
    match param.location {
        ParamLocation::Url => {
            let idx = template.path.find('?')?;
            let (base, query) = template.path.split_at(idx);
            let rebuilt: String = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(form_urlencoded::parse(query[1..].as_bytes()).map(|(k, v)| {
                    if k == param.name.as_str() {
                        (k.to_string(), value.to_string())
                    } else {
                        (k.to_string(), v.to_string())
                    }
                }))
                .finish();
            let new_path = format!("{base}?{rebuilt}");
            Some(template.raw.replacen(&template.path, &new_path, 1))
        }
        ParamLocation::BodyForm => {
            let rebuilt: String = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(
                    form_urlencoded::parse(template.body.as_bytes()).map(|(k, v)| {
                        if k == param.name.as_str() {
                            (k.to_string(), value.to_string())
                        } else {
                            (k.to_string(), v.to_string())
                        }
                    }),
                )
                .finish();
            Some(template.raw.replacen(&template.body, &rebuilt, 1))
        }
        ParamLocation::BodyJson => {
            let mut data: serde_json::Value = serde_json::from_str(&template.body).ok()?;
            let mut cursor = &mut data;
            let parts: Vec<&str> = param.path.split('.').collect();
            for part in &parts[..parts.len() - 1] {
                cursor = cursor.get_mut(part)?;
            }
            *cursor.get_mut(parts.last()?)? = serde_json::Value::String(value.to_string());
            let rebuilt = serde_json::to_string(&data).ok()?;
            Some(template.raw.replacen(&template.body, &rebuilt, 1))
        }
    }
}

/// Rewrite a URL so the vulnerable parameter's value reads `<PAYLOAD>`.
pub fn mark_url(raw_url: &str, param_name: &str) -> String {
    let Some((base, query)) = raw_url.split_once('?') else {
        return raw_url.to_string();
    };

    let marked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if name == param_name => format!("{name}=<PAYLOAD>"),
            _ => pair.to_string(),
        })
        .collect();

    format!("{base}?{}", marked.join("&"))
}

/// Rewrite a raw request so the vulnerable parameter's value reads
/// `<PAYLOAD>`.
pub fn mark_request(raw: &str, param: &Parameter) -> String {
    let needle = format!("{}={}", param.name, param.value);
    let replacement = format!("{}=<PAYLOAD>", param.name);
    raw.replacen(&needle, &replacement, 1)
}

/// Apply `Name: value` overrides to the header section of a raw request,
/// appending any not already present.
pub fn apply_headers_to_request(raw: &str, headers: &[String]) -> String {
    if headers.is_empty() || raw.lines().count() < 2 {
        return raw.to_string();
    }

    let overrides: Vec<(String, String)> = headers
        .iter()
        .filter_map(|h| {
            h.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect();

    let lines: Vec<&str> = raw.split('\n').collect();
    let header_end = lines
        .iter()
        .position(|l| l.trim().is_empty())
        .unwrap_or(lines.len());

    let mut result: Vec<String> = Vec::with_capacity(lines.len() + overrides.len());
    result.push(lines.first().copied().unwrap_or_default().to_string());

    let mut seen: Vec<&str> = Vec::new();
    for line in &lines[1.min(lines.len())..header_end] {
        if let Some(idx) = line.find(':') {
            let name = line[..idx].trim();
            if let Some((k, v)) = overrides
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
            {
                result.push(format!("{}: {v}", &line[..idx]));
                seen.push(k);
                continue;
            }
        }
        result.push(line.to_string());
    }

    for (k, v) in &overrides {
        if !seen.iter().any(|s| s.eq_ignore_ascii_case(k)) {
            result.push(format!("{k}: {v}"));
        }
    }

    for line in &lines[header_end..] {
        result.push(line.to_string());
    }

    result.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_url_parameters() {
        let t = RequestTemplate::parse("GET /s?q=shoes&page=2 HTTP/1.1\nHost: t\n\n").unwrap();
        let params = discover_url_parameters(&t);
        assert_eq!(params.len(), 2);
        assert!(params
            .iter()
            .any(|p| p.name == "q" && p.value == "shoes" && p.location == ParamLocation::Url));
    }

    #[test]
    fn discovers_form_and_json_parameters() {
        let form = RequestTemplate::parse(
            "POST /login HTTP/1.1\nHost: t\nContent-Type: application/x-www-form-urlencoded\n\nuser=bob&pass=x",
        )
        .unwrap();
        let params = discover_body_parameters(&form);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].location, ParamLocation::BodyForm);

        let json = RequestTemplate::parse(
            "POST /api HTTP/1.1\nHost: t\nContent-Type: application/json\n\n{\"user\":{\"name\":\"bob\"},\"q\":\"x\"}",
        )
        .unwrap();
        let params = discover_body_parameters(&json);
        assert_eq!(params.len(), 2);
        assert!(params.iter().any(|p| p.path == "user.name"));
    }

    #[test]
    fn rewrites_nested_json_parameter() {
        let t = RequestTemplate::parse(
            "POST /api HTTP/1.1\nHost: t\nContent-Type: application/json\n\n{\"user\":{\"name\":\"bob\"}}",
        )
        .unwrap();
        let param = Parameter {
            name: "name".to_string(),
            value: "bob".to_string(),
            location: ParamLocation::BodyJson,
            path: "user.name".to_string(),
        };
        let raw = rewrite_parameter(&t, &param, "eve'").unwrap();
        assert!(raw.contains("eve'"));
        assert!(!raw.contains("bob"));
    }

    #[test]
    fn marks_vulnerable_url_parameter() {
        let marked = mark_url("https://t.example/p?a=1&q=5&z=2", "q");
        assert_eq!(marked, "https://t.example/p?a=1&q=<PAYLOAD>&z=2");
    }

    #[test]
    fn marks_vulnerable_request_parameter() {
        let param = Parameter {
            name: "id".to_string(),
            value: "7".to_string(),
            location: ParamLocation::Url,
            path: String::new(),
        };
        let marked = mark_request("GET /x?id=7 HTTP/1.1\nHost: t\n", &param);
        assert!(marked.contains("id=<PAYLOAD>"));
    }

    #[test]
    fn custom_headers_override_and_append() {
        let raw = "GET / HTTP/1.1\nHost: t\nUser-Agent: old\n\nbody";
        let out = apply_headers_to_request(
            raw,
            &["User-Agent: new".to_string(), "X-Token: abc".to_string()],
        );
        assert!(out.contains("User-Agent: new"));
        assert!(!out.contains("User-Agent: old"));
        assert!(out.contains("X-Token: abc"));
        assert!(out.ends_with("body"));
    }
}
