//! `xsl:sort`: stable, multi-key ordering of a node list before iteration.

use crate::ast::SortKey;
use crate::avt::AttributeValueTemplate;
use crate::context::ExecutionContext;
use crate::error::TransformError;
use itertools::Itertools;
use std::cmp::Ordering;
use std::rc::Rc;
use trellis_tree::Node;
use trellis_xpath1::engine::string_to_number;

#[derive(Debug, Clone, Copy, PartialEq)]
enum DataType {
    Text,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CaseOrder {
    UpperFirst,
    LowerFirst,
}

#[derive(Debug, Clone, Copy)]
struct ResolvedKey {
    data_type: DataType,
    descending: bool,
    case_order: CaseOrder,
}

#[derive(Debug, Clone)]
enum SortValue {
    Text(String),
    Number(f64),
}

/// Sorts `nodes` by `keys`. Each key's `select` is evaluated with the node as context
/// and the unsorted list as the context node list. Nodes with equal keys keep their
/// relative order.
pub(crate) fn sort_nodes(ctx: &ExecutionContext, nodes: Vec<Node>, keys: &[SortKey]) -> Result<Vec<Node>, TransformError> {
    if keys.is_empty() || nodes.len() < 2 {
        return Ok(nodes);
    }
    let resolved = keys.iter().map(|key| resolve(ctx, key)).collect::<Result<Vec<_>, _>>()?;

    let list: Rc<[Node]> = Rc::from(nodes);
    let mut rows = Vec::with_capacity(list.len());
    for position in 1..=list.len() {
        let item = ctx.with_nodes(Rc::clone(&list), position);
        let mut values = Vec::with_capacity(keys.len());
        for (key, spec) in keys.iter().zip(&resolved) {
            let text = item.evaluate_string(&key.select)?;
            values.push(match spec.data_type {
                DataType::Text => SortValue::Text(text),
                DataType::Number => SortValue::Number(string_to_number(&text)),
            });
        }
        rows.push((list[position - 1].clone(), values));
    }

    Ok(rows
        .into_iter()
        .sorted_by(|(_, a), (_, b)| compare_rows(a, b, &resolved))
        .map(|(node, _)| node)
        .collect())
}

fn resolve(ctx: &ExecutionContext, key: &SortKey) -> Result<ResolvedKey, TransformError> {
    let data_type = match evaluate_option(ctx, key.data_type.as_ref())?.as_deref() {
        None | Some("text") => DataType::Text,
        Some("number") => DataType::Number,
        Some(other) => {
            log::warn!("Unknown sort data-type '{}', sorting as text", other);
            DataType::Text
        }
    };
    let descending = match evaluate_option(ctx, key.order.as_ref())?.as_deref() {
        None | Some("ascending") => false,
        Some("descending") => true,
        Some(other) => {
            return Err(TransformError::InvalidContent(format!("invalid sort order '{}'", other)));
        }
    };
    let case_order = match evaluate_option(ctx, key.case_order.as_ref())?.as_deref() {
        None | Some("upper-first") => CaseOrder::UpperFirst,
        Some("lower-first") => CaseOrder::LowerFirst,
        Some(other) => {
            return Err(TransformError::InvalidContent(format!("invalid sort case-order '{}'", other)));
        }
    };
    Ok(ResolvedKey {
        data_type,
        descending,
        case_order,
    })
}

fn evaluate_option(ctx: &ExecutionContext, avt: Option<&AttributeValueTemplate>) -> Result<Option<String>, TransformError> {
    avt.map(|avt| avt.evaluate(ctx)).transpose()
}

fn compare_rows(a: &[SortValue], b: &[SortValue], keys: &[ResolvedKey]) -> Ordering {
    for ((left, right), key) in a.iter().zip(b).zip(keys) {
        let ordering = compare_values(left, right, key.case_order);
        let ordering = if key.descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(left: &SortValue, right: &SortValue, case_order: CaseOrder) -> Ordering {
    match (left, right) {
        (SortValue::Number(l), SortValue::Number(r)) => compare_numbers(*l, *r),
        (SortValue::Text(l), SortValue::Text(r)) => compare_text(l, r, case_order),
        _ => Ordering::Equal,
    }
}

/// NaN sorts before every number.
fn compare_numbers(left: f64, right: f64) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

/// Compares case-insensitively first; strings differing only in case are ordered by the
/// case of the first differing character.
fn compare_text(left: &str, right: &str, case_order: CaseOrder) -> Ordering {
    let folded = left.to_lowercase().cmp(&right.to_lowercase());
    if folded != Ordering::Equal {
        return folded;
    }
    for (l, r) in left.chars().zip(right.chars()) {
        if l == r {
            continue;
        }
        let upper_first = if l.is_uppercase() && !r.is_uppercase() {
            Ordering::Less
        } else if r.is_uppercase() && !l.is_uppercase() {
            Ordering::Greater
        } else {
            l.cmp(&r)
        };
        return match case_order {
            CaseOrder::UpperFirst => upper_first,
            CaseOrder::LowerFirst => upper_first.reverse(),
        };
    }
    left.len().cmp(&right.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(data_type: DataType, descending: bool) -> ResolvedKey {
        ResolvedKey {
            data_type,
            descending,
            case_order: CaseOrder::UpperFirst,
        }
    }

    #[test]
    fn test_nan_sorts_first() {
        assert_eq!(compare_numbers(f64::NAN, -1e300), Ordering::Less);
        assert_eq!(compare_numbers(2.0, f64::NAN), Ordering::Greater);
        assert_eq!(compare_numbers(f64::NAN, f64::NAN), Ordering::Equal);
    }

    #[test]
    fn test_text_is_case_insensitive_with_case_tie_break() {
        assert_eq!(compare_text("apple", "Banana", CaseOrder::UpperFirst), Ordering::Less);
        assert_eq!(compare_text("Apple", "apple", CaseOrder::UpperFirst), Ordering::Less);
        assert_eq!(compare_text("Apple", "apple", CaseOrder::LowerFirst), Ordering::Greater);
        assert_eq!(compare_text("same", "same", CaseOrder::LowerFirst), Ordering::Equal);
    }

    #[test]
    fn test_later_keys_break_ties_and_descending_reverses() {
        let keys = [key(DataType::Text, false), key(DataType::Number, true)];
        let a = [SortValue::Text("x".into()), SortValue::Number(1.0)];
        let b = [SortValue::Text("x".into()), SortValue::Number(5.0)];
        assert_eq!(compare_rows(&a, &b, &keys), Ordering::Greater);

        let c = [SortValue::Text("a".into()), SortValue::Number(1.0)];
        assert_eq!(compare_rows(&c, &b, &keys), Ordering::Less);
    }
}
