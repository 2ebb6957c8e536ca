use crate::error::Error;
use std::collections::BTreeMap;

/// Uniform typed accessor over a string->string map (an ingress's
/// annotations or a configmap's data), producing the precise error strings
/// of design doc §4.6: `"<Kind> <namespace>/<name> '<key>' contains
/// invalid <type>: <cause>, ignoring"`.
pub struct TypedMap<'a> {
    kind: &'static str,
    namespace: String,
    name: String,
    data: &'a BTreeMap<String, String>,
}

impl<'a> TypedMap<'a> {
    pub fn new(
        kind: &'static str,
        namespace: impl Into<String>,
        name: impl Into<String>,
        data: &'a BTreeMap<String, String>,
    ) -> Self {
        TypedMap {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            data,
        }
    }

    /// Builds a `TypedMap` over an ingress's annotations, resolving `key`
    /// lookups against `<prefix>/<key>`.
    pub fn ingress(namespace: &str, name: &str, data: &'a BTreeMap<String, String>) -> Self {
        TypedMap::new("Ingress", namespace, name, data)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|s| s.as_str())
    }

    pub fn invalid_err(&self, key: &str, expected: &'static str, cause: impl ToString) -> Error {
        Error::input_invalid(self.kind, &self.namespace, &self.name, key, expected, cause)
    }

    /// Strict boolean: exactly `"true"` or `"false"` (design doc §4.6).
    pub fn get_bool(&self, key: &str, errors: &mut Vec<Error>) -> Option<bool> {
        match self.data.get(key).map(|s| s.as_str()) {
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(other) => {
                errors.push(self.invalid_err(key, "bool", format!("'{other}' is not a bool")));
                None
            }
            None => None,
        }
    }

    pub fn get_i64(&self, key: &str, errors: &mut Vec<Error>) -> Option<i64> {
        match self.data.get(key) {
            Some(v) => match v.trim().parse::<i64>() {
                Ok(n) => Some(n),
                Err(e) => {
                    errors.push(self.invalid_err(key, "int", e));
                    None
                }
            },
            None => None,
        }
    }

    /// Delimited string list; the delimiter is chosen per key by the
    /// caller (comma or newline, per §4.6).
    pub fn get_list(&self, key: &str, delimiter: char) -> Option<Vec<String>> {
        self.data.get(key).map(|v| {
            v.split(delimiter)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }
}

/// `serviceName=<svc> rewrite=<path>`, semicolon-delimited across services
/// (design doc §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub service_name: String,
    pub path: String,
}

pub fn parse_rewrites(value: &str) -> Result<Vec<Rewrite>, String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let mut service_name = None;
            let mut path = None;
            for field in entry.split_whitespace() {
                if let Some(v) = field.strip_prefix("serviceName=") {
                    service_name = Some(v.to_string());
                } else if let Some(v) = field.strip_prefix("rewrite=") {
                    path = Some(v.to_string());
                } else {
                    return Err(format!("unrecognized field '{field}' in rewrite entry"));
                }
            }
            match (service_name, path) {
                (Some(service_name), Some(path)) => Ok(Rewrite { service_name, path }),
                _ => Err(format!(
                    "rewrite entry '{entry}' missing serviceName or rewrite"
                )),
            }
        })
        .collect()
}

/// `serviceName=<svc> <cookie-spec>`, semicolon-delimited across services.
#[derive(Debug, Clone, PartialEq)]
pub struct StickyCookieSpec {
    pub service_name: String,
    pub cookie_spec: String,
}

pub fn parse_sticky_cookie_services(value: &str) -> Result<Vec<StickyCookieSpec>, String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let Some(rest) = entry.strip_prefix("serviceName=") else {
                return Err(format!(
                    "sticky-cookie entry '{entry}' missing serviceName"
                ));
            };
            let (service_name, cookie_spec) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| format!("sticky-cookie entry '{entry}' missing cookie spec"))?;
            Ok(StickyCookieSpec {
                service_name: service_name.to_string(),
                cookie_spec: cookie_spec.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_map_bool_is_strict() {
        let mut data = BTreeMap::new();
        data.insert("hsts".to_string(), "yes".to_string());
        let map = TypedMap::new("ConfigMap", "default", "cfg", &data);
        let mut errors = Vec::new();
        assert_eq!(map.get_bool("hsts", &mut errors), None);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn rewrites_parse_multiple_services() {
        let parsed =
            parse_rewrites("serviceName=coffee-svc rewrite=/beans;serviceName=tea-svc rewrite=/leaves")
                .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].service_name, "coffee-svc");
        assert_eq!(parsed[1].path, "/leaves");
    }

    #[test]
    fn sticky_cookie_services_parse() {
        let parsed =
            parse_sticky_cookie_services("serviceName=coffee-svc srv_id expires=1h path=/")
                .unwrap();
        assert_eq!(parsed[0].service_name, "coffee-svc");
        assert_eq!(parsed[0].cookie_spec, "srv_id expires=1h path=/");
    }
}
