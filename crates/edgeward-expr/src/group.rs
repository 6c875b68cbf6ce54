//! Conversion between flat, tagged condition lists and OR-ed groups.

use edgeward_contracts::condition::{Condition, ConditionGroup, LogicalOperator};

/// Split a flat condition list into AND-groups.
///
/// A condition tagged `or` starts a new group; anything else joins the
/// current one. The returned groups are re-tagged canonically, so the first
/// condition overall is `none`, each later group opens with `or` and every
/// other condition is `and`.
pub fn partition(flat: Vec<Condition>) -> Vec<ConditionGroup> {
    let mut raw: Vec<Vec<Condition>> = Vec::new();
    for condition in flat {
        match raw.last_mut() {
            Some(current) if condition.logical_operator != LogicalOperator::Or => {
                current.push(condition)
            }
            _ => raw.push(vec![condition]),
        }
    }
    raw.into_iter()
        .filter_map(ConditionGroup::new)
        .enumerate()
        .map(|(i, group)| group.tagged(leading_operator(i)))
        .collect()
}

/// Inverse of [`partition`]: tag every condition for flat serialization.
pub fn flatten(groups: &[ConditionGroup]) -> Vec<Condition> {
    groups
        .iter()
        .enumerate()
        .flat_map(|(i, group)| group.clone().tagged(leading_operator(i)).into_conditions())
        .collect()
}

fn leading_operator(group_index: usize) -> LogicalOperator {
    if group_index == 0 {
        LogicalOperator::None
    } else {
        LogicalOperator::Or
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeward_contracts::condition::{Field, Operator};

    fn cond(value: &str, op: LogicalOperator) -> Condition {
        Condition::new(Field::FullUri, Operator::Contains, value).joined(op)
    }

    fn values(group: &ConditionGroup) -> Vec<String> {
        group
            .iter()
            .map(|c| c.value.as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn or_starts_a_new_group() {
        let groups = partition(vec![
            cond("a", LogicalOperator::None),
            cond("b", LogicalOperator::And),
            cond("c", LogicalOperator::Or),
            cond("d", LogicalOperator::And),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(values(&groups[0]), vec!["a", "b"]);
        assert_eq!(values(&groups[1]), vec!["c", "d"]);
    }

    #[test]
    fn leading_or_does_not_create_an_empty_group() {
        let groups = partition(vec![cond("a", LogicalOperator::Or), cond("b", LogicalOperator::And)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].conditions()[0].logical_operator, LogicalOperator::None);
    }

    #[test]
    fn missing_tags_are_treated_as_and() {
        let groups = partition(vec![cond("a", LogicalOperator::None), cond("b", LogicalOperator::None)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].conditions()[1].logical_operator, LogicalOperator::And);
    }

    #[test]
    fn flatten_tags_group_boundaries() {
        let groups = partition(vec![
            cond("a", LogicalOperator::None),
            cond("b", LogicalOperator::Or),
            cond("c", LogicalOperator::And),
        ]);
        let tags: Vec<_> = flatten(&groups).iter().map(|c| c.logical_operator).collect();
        assert_eq!(tags, vec![LogicalOperator::None, LogicalOperator::Or, LogicalOperator::And]);
    }

    #[test]
    fn empty_in_empty_out() {
        assert!(partition(vec![]).is_empty());
        assert!(flatten(&[]).is_empty());
    }
}
