const NAMESPACE: &str = "{namespace}";
const NAME: &str = "{name}";

/// Replace the namespace and object name segments of a Kubernetes API path with placeholders,
/// so metrics are grouped per endpoint instead of per object.
///
/// `/api/v1/namespaces/default/secrets/demo` becomes `/api/v1/namespaces/{namespace}/secrets/{name}`.
pub fn template_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let prefix_len = match segments.first() {
        Some(&"api") => 2,
        Some(&"apis") => 3,
        _ => return path.to_string(),
    };
    if segments.len() <= prefix_len {
        return path.to_string();
    }

    let (prefix, rest) = segments.split_at(prefix_len);
    let mut templated: Vec<&str> = prefix.to_vec();
    let resource = match rest {
        ["namespaces", _] => {
            templated.extend(["namespaces", NAMESPACE]);
            &[][..]
        }
        ["namespaces", _, resource @ ..] => {
            templated.extend(["namespaces", NAMESPACE]);
            resource
        }
        resource => resource,
    };
    match resource {
        [] => {}
        [plural] => templated.push(*plural),
        [plural, _, subresource @ ..] => {
            templated.extend([*plural, NAME]);
            templated.extend(subresource);
        }
    }
    format!("/{}", templated.join("/"))
}
