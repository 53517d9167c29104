//! Filter query builder.
//!
//! Rules and groups live in a flat arena addressed by [`NodeId`]. The builder owns
//! the tree; the session only reads it through [`QueryBuilder::to_wire_query`],
//! which produces the compose-query JSON the dataset backend understands.

use crate::dictionary::{DataDictionary, DataType, FieldMeta};
use crate::value::Scalar;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("operator `{operator}` is not allowed for {data_type} field `{field}`")]
    OperatorNotAllowed {
        field: String,
        operator: Operator,
        data_type: DataType,
    },
    #[error("operator `{0}` takes a single value, not a list")]
    ValueShape(Operator),
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    #[error("cannot parse filter rule `{0}` (expected FIELD OP VALUE)")]
    Parse(String),
    #[error("the data dictionary has no fields")]
    EmptyDictionary,
}

/// Comparison operator of a leaf predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    ILike,
    In,
    NotIn,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "like",
            Operator::NotLike => "not like",
            Operator::ILike => "ilike",
            Operator::In => "in",
            Operator::NotIn => "not in",
        }
    }

    /// `in` and `not in` take a list of values.
    pub fn is_multi(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(match normalized.to_lowercase().as_str() {
            "=" | "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "ilike" => Operator::ILike,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            _ => return Err(QueryError::UnknownOperator(s.to_string())),
        })
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Boolean combinator of a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
    #[default]
    And,
    Or,
}

impl GroupOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupOperator::And => "and",
            GroupOperator::Or => "or",
        }
    }
}

/// Value of a rule as entered by the user, before type coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RuleValue {
    #[default]
    Empty,
    Single(Scalar),
    List(Vec<Scalar>),
}

impl RuleValue {
    pub fn is_empty(&self) -> bool {
        match self {
            RuleValue::Empty => true,
            RuleValue::Single(s) => s.is_missing(),
            RuleValue::List(items) => items.is_empty(),
        }
    }
}

impl From<&str> for RuleValue {
    fn from(s: &str) -> Self {
        RuleValue::Single(Scalar::from(s))
    }
}

impl From<Vec<&str>> for RuleValue {
    fn from(items: Vec<&str>) -> Self {
        RuleValue::List(items.into_iter().map(Scalar::from).collect())
    }
}

/// A leaf predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub field: String,
    pub operator: Operator,
    pub value: RuleValue,
}

/// Partial update for [`QueryBuilder::update_rule`]. `None` leaves a part unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulePatch {
    pub field: Option<String>,
    pub operator: Option<Operator>,
    pub value: Option<RuleValue>,
}

impl RulePatch {
    pub fn field(key: &str) -> Self {
        Self {
            field: Some(key.to_string()),
            ..Default::default()
        }
    }

    pub fn operator(op: Operator) -> Self {
        Self {
            operator: Some(op),
            ..Default::default()
        }
    }

    pub fn value(value: impl Into<RuleValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }
}

/// Handle to a node of one [`QueryBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Group {
        operator: GroupOperator,
        children: Vec<NodeId>,
    },
    Rule(Rule),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// Read-only view of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Group {
        operator: GroupOperator,
        children: &'a [NodeId],
    },
    Rule(&'a Rule),
}

/// Editable filter tree over one dataset's dictionary.
///
/// Node ids and paths that do not resolve are caller bugs and panic. Input the
/// user controls (field keys, operators, values) is validated and rejected with
/// a [`QueryError`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dictionary: Arc<DataDictionary>,
    nodes: Vec<Option<Node>>,
    root: NodeId,
}

impl QueryBuilder {
    pub fn new(dictionary: Arc<DataDictionary>) -> Self {
        Self {
            dictionary,
            nodes: vec![Some(Node {
                parent: None,
                kind: NodeKind::Group {
                    operator: GroupOperator::And,
                    children: Vec::new(),
                },
            })],
            root: NodeId(0),
        }
    }

    pub fn dictionary(&self) -> &DataDictionary {
        &self.dictionary
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// True when the root has no children, meaning no filter.
    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// Drop every rule and group, leaving an empty AND root.
    pub fn clear(&mut self) {
        *self = Self::new(Arc::clone(&self.dictionary));
    }

    pub fn get(&self, id: NodeId) -> NodeRef<'_> {
        match &self.node(id).kind {
            NodeKind::Group { operator, children } => NodeRef::Group {
                operator: *operator,
                children,
            },
            NodeKind::Rule(rule) => NodeRef::Rule(rule),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Children of a group.
    pub fn children(&self, group: NodeId) -> &[NodeId] {
        match &self.node(group).kind {
            NodeKind::Group { children, .. } => children,
            NodeKind::Rule(_) => panic!("node {group:?} is a rule, not a group"),
        }
    }

    pub fn group_operator(&self, group: NodeId) -> GroupOperator {
        match &self.node(group).kind {
            NodeKind::Group { operator, .. } => *operator,
            NodeKind::Rule(_) => panic!("node {group:?} is a rule, not a group"),
        }
    }

    pub fn rule(&self, id: NodeId) -> &Rule {
        match &self.node(id).kind {
            NodeKind::Rule(rule) => rule,
            NodeKind::Group { .. } => panic!("node {id:?} is a group, not a rule"),
        }
    }

    /// Resolve a path of child indices from the root to a group.
    pub fn group_at(&self, path: &[usize]) -> NodeId {
        let mut id = self.root;
        for (depth, &index) in path.iter().enumerate() {
            id = *self.children(id).get(index).unwrap_or_else(|| {
                panic!("group path {path:?} has no child {index} at depth {depth}")
            });
        }
        if let NodeKind::Rule(_) = self.node(id).kind {
            panic!("group path {path:?} ends at a rule");
        }
        id
    }

    /// The rule at `index` within `group`.
    pub fn rule_at(&self, group: NodeId, index: usize) -> NodeId {
        let id = *self
            .children(group)
            .get(index)
            .unwrap_or_else(|| panic!("group {group:?} has no child {index}"));
        self.rule(id);
        id
    }

    /// Number of rules in the whole tree.
    pub fn rule_count(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| matches!(n.kind, NodeKind::Rule(_)))
            .count()
    }

    /// Append a rule. Without an operator the field's first operator is used.
    pub fn add_rule(
        &mut self,
        group: NodeId,
        field: &str,
        operator: Option<Operator>,
        value: RuleValue,
    ) -> Result<NodeId, QueryError> {
        self.children(group);
        let meta = self.field_meta(field)?;
        let operator = operator.unwrap_or_else(|| meta.default_operator());
        check_operator(meta, operator)?;
        check_value_shape(operator, &value)?;
        let rule = Rule {
            field: field.to_string(),
            operator,
            value,
        };
        Ok(self.push_child(group, NodeKind::Rule(rule)))
    }

    /// Append a rule on the first dictionary field with its default operator and no value.
    pub fn add_default_rule(&mut self, group: NodeId) -> Result<NodeId, QueryError> {
        let key = self
            .dictionary
            .fields
            .first()
            .map(|f| f.key.clone())
            .ok_or(QueryError::EmptyDictionary)?;
        self.add_rule(group, &key, None, RuleValue::Empty)
    }

    /// Append a rule written as `FIELD OP VALUE`, e.g. `age >= 40` or `sex in M,F`.
    pub fn add_rule_text(&mut self, group: NodeId, text: &str) -> Result<NodeId, QueryError> {
        let (field, operator, value) = parse_rule(text)?;
        self.add_rule(group, &field, Some(operator), value)
    }

    /// Builder holding `rules` (each `FIELD OP VALUE`) at the root, joined by `operator`.
    pub fn from_rules<S: AsRef<str>>(
        dictionary: Arc<DataDictionary>,
        rules: &[S],
        operator: GroupOperator,
    ) -> Result<Self, QueryError> {
        let mut builder = Self::new(dictionary);
        let root = builder.root();
        builder.set_group_operator(root, operator);
        for rule in rules {
            builder.add_rule_text(root, rule.as_ref())?;
        }
        Ok(builder)
    }

    /// Append an empty AND subgroup.
    pub fn add_group(&mut self, group: NodeId) -> NodeId {
        self.children(group);
        self.push_child(
            group,
            NodeKind::Group {
                operator: GroupOperator::And,
                children: Vec::new(),
            },
        )
    }

    /// Apply a patch to a rule.
    ///
    /// Changing the field resets the operator to the new field's first operator
    /// and clears the value. Changing the operator clears the value unless the
    /// patch carries one. The rule is left untouched when validation fails.
    pub fn update_rule(&mut self, id: NodeId, patch: RulePatch) -> Result<(), QueryError> {
        let mut rule = self.rule(id).clone();

        if let Some(field) = patch.field {
            let meta = self.field_meta(&field)?;
            if field != rule.field {
                rule.operator = meta.default_operator();
                rule.value = RuleValue::Empty;
                rule.field = field;
            }
        }
        if let Some(op) = patch.operator {
            check_operator(self.field_meta(&rule.field)?, op)?;
            if op != rule.operator {
                rule.operator = op;
                rule.value = RuleValue::Empty;
            }
        }
        if let Some(value) = patch.value {
            rule.value = value;
        }
        check_value_shape(rule.operator, &rule.value)?;

        if let Some(Some(node)) = self.nodes.get_mut(id.0) {
            node.kind = NodeKind::Rule(rule);
        }
        Ok(())
    }

    /// Remove a rule or group (with its subtree). The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) {
        let parent = self
            .node(id)
            .parent
            .unwrap_or_else(|| panic!("the root group cannot be removed"));
        if let Some(Some(Node {
            kind: NodeKind::Group { children, .. },
            ..
        })) = self.nodes.get_mut(parent.0)
        {
            children.retain(|c| *c != id);
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(next.0).and_then(Option::take) {
                if let NodeKind::Group { children, .. } = node.kind {
                    stack.extend(children);
                }
            }
        }
    }

    /// Remove the child at `index` of `group`.
    pub fn remove_child(&mut self, group: NodeId, index: usize) {
        let id = *self
            .children(group)
            .get(index)
            .unwrap_or_else(|| panic!("group {group:?} has no child {index}"));
        self.remove(id);
    }

    pub fn set_group_operator(&mut self, group: NodeId, op: GroupOperator) {
        self.children(group);
        if let Some(Some(Node {
            kind: NodeKind::Group { operator, .. },
            ..
        })) = self.nodes.get_mut(group.0)
        {
            *operator = op;
        }
    }

    /// Wire form of the tree, or `None` when nothing constrains the rows.
    ///
    /// Empty groups are pruned at every level, so a tree of empty groups is
    /// unfiltered too.
    pub fn to_wire_query(&self) -> Option<ComposeQuery> {
        self.wire_group(self.root)
    }

    fn wire_group(&self, group: NodeId) -> Option<ComposeQuery> {
        let items: Vec<QueryItem> = self
            .children(group)
            .iter()
            .filter_map(|&child| match &self.node(child).kind {
                NodeKind::Rule(rule) => Some(QueryItem::Leaf(self.wire_rule(rule))),
                NodeKind::Group { .. } => self.wire_group(child).map(QueryItem::Compose),
            })
            .collect();
        if items.is_empty() {
            None
        } else {
            Some(ComposeQuery {
                operator: self.group_operator(group),
                items,
            })
        }
    }

    fn wire_rule(&self, rule: &Rule) -> LeafQuery {
        let data_type = self
            .dictionary
            .field(&rule.field)
            .map(|f| f.data_type.clone())
            .unwrap_or(DataType::String);
        LeafQuery {
            field: rule.field.clone(),
            operator: rule.operator,
            value: coerce_value(&data_type, rule.operator, &rule.value),
        }
    }

    fn field_meta(&self, key: &str) -> Result<&FieldMeta, QueryError> {
        self.dictionary
            .field(key)
            .ok_or_else(|| QueryError::UnknownField(key.to_string()))
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("node {id:?} does not exist in this query"))
    }

    fn push_child(&mut self, group: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            parent: Some(group),
            kind,
        }));
        if let Some(Some(Node {
            kind: NodeKind::Group { children, .. },
            ..
        })) = self.nodes.get_mut(group.0)
        {
            children.push(id);
        }
        id
    }
}

fn check_operator(meta: &FieldMeta, operator: Operator) -> Result<(), QueryError> {
    if meta.data_type.allows(operator) {
        Ok(())
    } else {
        Err(QueryError::OperatorNotAllowed {
            field: meta.key.clone(),
            operator,
            data_type: meta.data_type.clone(),
        })
    }
}

fn check_value_shape(operator: Operator, value: &RuleValue) -> Result<(), QueryError> {
    match value {
        RuleValue::List(_) if !operator.is_multi() => Err(QueryError::ValueShape(operator)),
        _ => Ok(()),
    }
}

fn rule_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let field = r"([A-Za-z_][A-Za-z0-9_.\-]*)";
        // Regex::new only fails on invalid patterns; these are fixed literals.
        let words = Regex::new(&format!(
            r"(?i)^\s*{field}\s+(not\s+like|not\s+in|ilike|like|in)\s+(.*?)\s*$"
        ));
        let symbols = Regex::new(&format!(r"^\s*{field}\s*(!=|<=|>=|==|=|<|>)\s*(.*?)\s*$"));
        match (words, symbols) {
            (Ok(w), Ok(s)) => (w, s),
            (Err(e), _) | (_, Err(e)) => panic!("invalid rule pattern: {e}"),
        }
    })
}

/// Parse `FIELD OP VALUE`. Values of `in`/`not in` are comma separated.
pub fn parse_rule(text: &str) -> Result<(String, Operator, RuleValue), QueryError> {
    let (words, symbols) = rule_patterns();
    let caps = words
        .captures(text)
        .or_else(|| symbols.captures(text))
        .ok_or_else(|| QueryError::Parse(text.to_string()))?;
    let field = caps[1].to_string();
    let operator: Operator = caps[2].parse()?;
    let raw = caps[3].trim();
    let value = if operator.is_multi() {
        RuleValue::List(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Scalar::from)
                .collect(),
        )
    } else if raw.is_empty() {
        RuleValue::Empty
    } else {
        RuleValue::Single(Scalar::from(raw))
    };
    Ok((field, operator, value))
}

/// One scalar of the wire format, after type coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireScalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for WireScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireScalar::Null => f.write_str("null"),
            WireScalar::Bool(b) => write!(f, "{b}"),
            WireScalar::Int(i) => write!(f, "{i}"),
            WireScalar::Float(x) => write!(f, "{x}"),
            WireScalar::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    List(Vec<WireScalar>),
    Scalar(WireScalar),
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Scalar(s) => write!(f, "{s}"),
            WireValue::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafQuery {
    pub field: String,
    pub operator: Operator,
    pub value: WireValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryItem {
    Compose(ComposeQuery),
    Leaf(LeafQuery),
}

/// Wire form of a filter group: `{operator, items}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeQuery {
    pub operator: GroupOperator,
    pub items: Vec<QueryItem>,
}

impl ComposeQuery {
    /// JSON text passed as the `query` request parameter.
    pub fn to_query_param(&self) -> String {
        // Serializing plain enums and strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Number of leaf predicates at any depth.
    pub fn leaf_count(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                QueryItem::Leaf(_) => 1,
                QueryItem::Compose(c) => c.leaf_count(),
            })
            .sum()
    }
}

/// Human-readable filter summary: `(sex = M AND (age in 30, 40 OR os_status = 1))`.
impl fmt::Display for ComposeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joiner = format!(" {} ", self.operator.as_str().to_uppercase());
        f.write_str("(")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(&joiner)?;
            }
            match item {
                QueryItem::Leaf(leaf) => {
                    write!(f, "{} {} {}", leaf.field, leaf.operator, leaf.value)?
                }
                QueryItem::Compose(group) => write!(f, "{group}")?,
            }
        }
        f.write_str(")")
    }
}

/// Coerce a rule value to the wire type of its field.
pub fn coerce_value(data_type: &DataType, operator: Operator, value: &RuleValue) -> WireValue {
    match (value, operator.is_multi()) {
        (RuleValue::Empty, true) => WireValue::List(Vec::new()),
        (RuleValue::Empty, false) => WireValue::Scalar(WireScalar::Null),
        (RuleValue::Single(v), true) => WireValue::List(vec![coerce_scalar(data_type, v)]),
        (RuleValue::Single(v), false) => WireValue::Scalar(coerce_scalar(data_type, v)),
        (RuleValue::List(items), _) => WireValue::List(
            items
                .iter()
                .map(|v| coerce_scalar(data_type, v))
                .collect(),
        ),
    }
}

/// Coerce one scalar.
///
/// NUMBER text becomes an integer when it has no `.`, a float otherwise;
/// text that does not parse is passed through. BOOLEAN text is `true` only
/// for exactly `"true"`.
pub fn coerce_scalar(data_type: &DataType, value: &Scalar) -> WireScalar {
    match (data_type, value) {
        (_, Scalar::Null) => WireScalar::Null,
        (DataType::Boolean, Scalar::Bool(b)) => WireScalar::Bool(*b),
        (DataType::Boolean, other) => WireScalar::Bool(other.to_string() == "true"),
        (DataType::Number, Scalar::String(s)) => parse_number(s),
        (_, Scalar::Number(n)) => number_to_wire(*n),
        (_, Scalar::Bool(b)) => WireScalar::Bool(*b),
        (_, Scalar::String(s)) => WireScalar::String(s.clone()),
    }
}

fn parse_number(text: &str) -> WireScalar {
    let t = text.trim();
    let parsed = if t.contains('.') {
        t.parse::<f64>().ok().map(WireScalar::Float)
    } else {
        t.parse::<i64>()
            .ok()
            .map(WireScalar::Int)
            .or_else(|| t.parse::<f64>().ok().map(WireScalar::Float))
    };
    parsed.unwrap_or_else(|| WireScalar::String(text.to_string()))
}

fn number_to_wire(n: f64) -> WireScalar {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        WireScalar::Int(n as i64)
    } else {
        WireScalar::Float(n)
    }
}
