//! The category ordering table.
//!
//! Firewall rules of different categories share one ordered container, and
//! evaluation order matters: allow-list skips must run before block-list
//! blocks, and geo blocks after both. The table says where a new rule of a
//! category goes relative to rules of an anchor category. It is consulted
//! only on create; patches never move a rule.

use edgeward_contracts::{
    policy::Category,
    remote::{RulePosition, RulesetSnapshot},
};

/// Placement relative to an anchor category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Before the first rule of the anchor category.
    BeforeFirst(Category),
    /// After the last rule of the anchor category.
    AfterLast(Category),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingRule {
    pub category: Category,
    pub anchor: Anchor,
}

/// Categories not listed here are appended at the end.
pub const ORDERING_TABLE: &[OrderingRule] = &[
    OrderingRule {
        category: Category::WhitelistIp,
        anchor: Anchor::BeforeFirst(Category::BlacklistIp),
    },
    OrderingRule {
        category: Category::BlacklistIp,
        anchor: Anchor::AfterLast(Category::WhitelistIp),
    },
    OrderingRule {
        category: Category::Country,
        anchor: Anchor::AfterLast(Category::BlacklistIp),
    },
];

pub fn anchor_for(category: Category) -> Option<Anchor> {
    ORDERING_TABLE
        .iter()
        .find(|rule| rule.category == category)
        .map(|rule| rule.anchor)
}

/// Resolve the position hint for creating a `category` rule in `snapshot`.
///
/// Anchors are matched by tag prefix across the whole container, whatever
/// domain they belong to. Returns `None` (append) when the category has no
/// table entry or no anchor rule exists.
pub fn resolve_position(category: Category, snapshot: &RulesetSnapshot) -> Option<RulePosition> {
    let anchored = |anchor: Category| snapshot.rules.iter().filter(move |r| anchor.owns_tag(&r.tag));
    match anchor_for(category)? {
        Anchor::BeforeFirst(anchor) => anchored(anchor)
            .next()
            .map(|r| RulePosition::Before(r.id.clone())),
        Anchor::AfterLast(anchor) => anchored(anchor)
            .last()
            .map(|r| RulePosition::After(r.id.clone())),
    }
}
