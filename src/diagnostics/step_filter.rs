use super::model::Step;

/// Picks the step named by `filter`, case-insensitively.
///
/// Tried in order: exact match, then substring (prefixes are substrings, so
/// they fall in the same tier). Within a tier the first step in listing
/// order wins; there is no ranking beyond that.
pub fn select_step<'a>(steps: &'a [Step], filter: &str) -> Option<&'a Step> {
    let needle = filter.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let names: Vec<String> = steps.iter().map(|step| step.name.to_lowercase()).collect();

    let position = names
        .iter()
        .position(|name| *name == needle)
        .or_else(|| names.iter().position(|name| name.contains(&needle)));

    position.map(|index| &steps[index])
}

/// Applies the optional name filter and the failed-only toggle.
pub fn filter_steps<'a>(steps: &'a [Step], name: Option<&str>, failed_only: bool) -> Vec<&'a Step> {
    let selected: Vec<&Step> = match name {
        Some(filter) => select_step(steps, filter).into_iter().collect(),
        None => steps.iter().collect(),
    };

    if failed_only {
        selected
            .into_iter()
            .filter(|step| step.state().is_failure())
            .collect()
    } else {
        selected
    }
}
