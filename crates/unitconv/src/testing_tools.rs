use miette::Diagnostic;

/// Flattens the labels of a diagnostic into `(offset, length, label)` triples
pub fn labels(diagnostic: &dyn Diagnostic) -> Vec<(usize, usize, String)> {
    diagnostic
        .labels()
        .into_iter()
        .flatten()
        .map(|span| {
            (
                span.offset(),
                span.len(),
                span.label().unwrap_or_default().to_owned(),
            )
        })
        .collect()
}
