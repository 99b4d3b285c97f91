//! Routing-key ↔ subject translation.
//!
//! Binding keys use the classic topic grammar (`*` one token, `#` rest);
//! NATS spells those `*` and `>`.

/// Subject a message with `routing_key` is published under in `exchange`.
pub fn routing_subject(exchange: &str, routing_key: &str) -> String {
    format!("{exchange}.{routing_key}")
}

/// Translate a binding key into a NATS filter subject for `exchange`.
pub fn binding_to_subject(exchange: &str, binding_key: &str) -> String {
    let translated: Vec<&str> = binding_key
        .split('.')
        .map(|tok| if tok == "#" { ">" } else { tok })
        .collect();
    format!("{exchange}.{}", translated.join("."))
}

/// Strip the exchange prefix off a delivered subject, recovering the
/// routing key the producer used.
pub fn subject_to_routing_key<'a>(exchange: &str, subject: &'a str) -> &'a str {
    subject
        .strip_prefix(exchange)
        .and_then(|s| s.strip_prefix('.'))
        .unwrap_or(subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_binding() {
        assert_eq!(
            binding_to_subject("project_events", "project.deletion.initiated"),
            "project_events.project.deletion.initiated"
        );
    }

    #[test]
    fn star_wildcard_passes_through() {
        assert_eq!(
            binding_to_subject("project_events", "resource.for_project.deleted.*"),
            "project_events.resource.for_project.deleted.*"
        );
    }

    #[test]
    fn hash_becomes_gt() {
        assert_eq!(
            binding_to_subject("results_exchange", "inference.result.#"),
            "results_exchange.inference.result.>"
        );
    }

    #[test]
    fn routing_key_recovered_from_subject() {
        let subject = routing_subject("resource_events", "model.deleted");
        assert_eq!(
            subject_to_routing_key("resource_events", &subject),
            "model.deleted"
        );
    }

    #[test]
    fn foreign_subject_returned_unchanged() {
        assert_eq!(
            subject_to_routing_key("user_events", "other.subject"),
            "other.subject"
        );
    }
}
