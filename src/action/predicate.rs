//! Filter predicates with SQL three-valued logic.
//!
//! A predicate action answers `Success` when it evaluates to `True` and
//! `False` otherwise. The exact [`Boolean`] stays readable through
//! [`Action::predicate_value`] so that `NOT` and `OR` can tell an `Unknown`
//! apart from a `False`.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionState, ListControl, Status, explain_action};
use crate::archive::ActionArchive;
use crate::arena::{ActionId, VarId};
use crate::context::ExecutionContext;
use crate::error::{KernelError, Result};
use crate::explain::Explain;
use crate::holder::{ActionHolder, DataHolder};
use crate::value::Value;

// ------------- Boolean -------------
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Boolean {
    True,
    False,
    #[default]
    Unknown,
}

impl Boolean {
    pub fn is_true(self) -> bool {
        self == Boolean::True
    }
    pub fn to_status(self) -> Status {
        if self.is_true() { Status::Success } else { Status::False }
    }
}

impl From<bool> for Boolean {
    fn from(b: bool) -> Self {
        if b { Boolean::True } else { Boolean::False }
    }
}

/// False dominates, then Unknown.
pub fn bool_and(a: Boolean, b: Boolean) -> Boolean {
    match (a, b) {
        (Boolean::False, _) | (_, Boolean::False) => Boolean::False,
        (Boolean::True, Boolean::True) => Boolean::True,
        _ => Boolean::Unknown,
    }
}

/// True dominates, then Unknown; False is the identity.
pub fn bool_or(a: Boolean, b: Boolean) -> Boolean {
    match (a, b) {
        (Boolean::True, _) | (_, Boolean::True) => Boolean::True,
        (Boolean::False, Boolean::False) => Boolean::False,
        _ => Boolean::Unknown,
    }
}

pub fn bool_not(a: Boolean) -> Boolean {
    match a {
        Boolean::True => Boolean::False,
        Boolean::False => Boolean::True,
        Boolean::Unknown => Boolean::Unknown,
    }
}

// ------------- Comparison -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Equals,
    LessThanEquals,
    GreaterThanEquals,
    LessThan,
    GreaterThan,
    NotEquals,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Equals => "=",
            CompareOp::LessThanEquals => "<=",
            CompareOp::GreaterThanEquals => ">=",
            CompareOp::LessThan => "<",
            CompareOp::GreaterThan => ">",
            CompareOp::NotEquals => "<>",
        }
    }
    /// Unknown when either operand was null.
    pub fn test(self, ordering: Option<Ordering>) -> Boolean {
        let Some(ordering) = ordering else {
            return Boolean::Unknown;
        };
        let holds = match self {
            CompareOp::Equals => ordering == Ordering::Equal,
            CompareOp::LessThanEquals => ordering != Ordering::Greater,
            CompareOp::GreaterThanEquals => ordering != Ordering::Less,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::NotEquals => ordering != Ordering::Equal,
        };
        holds.into()
    }
}

#[derive(Debug)]
pub struct Comparison {
    op: CompareOp,
    left: DataHolder,
    right: DataHolder,
    result: Boolean,
    state: ActionState,
}

impl Comparison {
    pub fn new(op: CompareOp, left: VarId, right: VarId) -> Self {
        Self {
            op,
            left: DataHolder::new(left),
            right: DataHolder::new(right),
            result: Boolean::Unknown,
            state: ActionState::default(),
        }
    }
}

impl Action for Comparison {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        self.left.explain(explain);
        explain.put(format!(" {} ", self.op.symbol()));
        self.right.explain(explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.left.initialize(ctx)?;
        self.right.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.left.terminate(ctx)?;
        self.right.terminate(ctx)
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            let left = self.left.value()?;
            let right = self.right.value()?;
            self.result = self.op.test(left.compare_to(&right, self.op.symbol())?);
            self.state.done(self.result.to_status());
        }
        Ok(self.state.status())
    }
    fn reset(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        self.result = Boolean::Unknown;
        self.state.clear();
        Ok(())
    }
    fn undone(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.reset(ctx)
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn predicate_value(&self) -> Option<Boolean> {
        Some(self.result)
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::Comparison { op: self.op, left: self.left.id(), right: self.right.id() }
    }
}

// ------------- IsNull -------------
/// `IS NULL`, or `IS NOT NULL` when negated. Never Unknown.
#[derive(Debug)]
pub struct NullCheck {
    negated: bool,
    operand: DataHolder,
    result: Boolean,
    state: ActionState,
}

impl NullCheck {
    pub fn is_null(operand: VarId) -> Self {
        Self::new(false, operand)
    }
    pub fn is_not_null(operand: VarId) -> Self {
        Self::new(true, operand)
    }
    pub fn new(negated: bool, operand: VarId) -> Self {
        Self {
            negated,
            operand: DataHolder::new(operand),
            result: Boolean::Unknown,
            state: ActionState::default(),
        }
    }
}

impl Action for NullCheck {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        self.operand.explain(explain);
        explain.put(if self.negated { " is not null" } else { " is null" });
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.operand.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.operand.terminate(ctx)
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            self.result = (self.operand.is_null()? != self.negated).into();
            self.state.done(self.result.to_status());
        }
        Ok(self.state.status())
    }
    fn reset(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        self.result = Boolean::Unknown;
        self.state.clear();
        Ok(())
    }
    fn undone(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.reset(ctx)
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn predicate_value(&self) -> Option<Boolean> {
        Some(self.result)
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::NullCheck { negated: self.negated, operand: self.operand.id() }
    }
}

// ------------- Like -------------
/// SQL `LIKE`: `%` matches any run, `_` one character, and the optional
/// escape character makes the following character literal.
#[derive(Debug)]
pub struct Like {
    operand: DataHolder,
    pattern: String,
    escape: Option<char>,
    case_insensitive: bool,
    matcher: Option<Regex>,
    result: Boolean,
    state: ActionState,
}

impl Like {
    pub fn new(operand: VarId, pattern: impl Into<String>) -> Self {
        Self {
            operand: DataHolder::new(operand),
            pattern: pattern.into(),
            escape: None,
            case_insensitive: false,
            matcher: None,
            result: Boolean::Unknown,
            state: ActionState::default(),
        }
    }
    pub fn escape(mut self, escape: char) -> Self {
        self.escape = Some(escape);
        self
    }
    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }
}

/// Translates a LIKE pattern into an anchored regular expression.
pub fn compile_like(pattern: &str, escape: Option<char>, case_insensitive: bool) -> Result<Regex> {
    let invalid = |message: &str| KernelError::InvalidPattern {
        pattern: pattern.to_owned(),
        message: message.to_owned(),
    };
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push_str("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if Some(c) == escape {
            let literal = chars.next().ok_or_else(|| invalid("pattern ends with the escape character"))?;
            expression.push_str(&regex::escape(literal.encode_utf8(&mut [0; 4])));
            continue;
        }
        match c {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            c => expression.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expression.push('$');
    RegexBuilder::new(&expression)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| invalid(&e.to_string()))
}

impl Action for Like {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        self.operand.explain(explain);
        explain.put(format!(" like '{}'", self.pattern));
        if let Some(escape) = self.escape {
            explain.put(format!(" escape '{escape}'"));
        }
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.operand.initialize(ctx)?;
        if self.matcher.is_none() {
            self.matcher = Some(compile_like(&self.pattern, self.escape, self.case_insensitive)?);
        }
        Ok(())
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.matcher = None;
        self.operand.terminate(ctx)
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            let matcher = self
                .matcher
                .as_ref()
                .ok_or_else(|| KernelError::unexpected("like evaluated before initialize"))?;
            self.result = match self.operand.value()? {
                Value::Null => Boolean::Unknown,
                Value::Text(text) => matcher.is_match(&text).into(),
                other => {
                    return Err(KernelError::InvalidArgumentType {
                        predicate: "like",
                        found: other.type_name().into(),
                    });
                }
            };
            self.state.done(self.result.to_status());
        }
        Ok(self.state.status())
    }
    fn reset(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        self.result = Boolean::Unknown;
        self.state.clear();
        Ok(())
    }
    fn undone(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.reset(ctx)
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn predicate_value(&self) -> Option<Boolean> {
        Some(self.result)
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::Like {
            operand: self.operand.id(),
            pattern: self.pattern.clone(),
            escape: self.escape,
            case_insensitive: self.case_insensitive,
        }
    }
}

// ------------- Combinator -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombinatorKind {
    And,
    Or,
    Not,
}

/// `AND`/`OR` over any number of predicate actions, or `NOT` over one.
/// Operands are evaluated left to right and evaluation stops as soon as the
/// outcome is settled.
#[derive(Debug)]
pub struct Combinator {
    kind: CombinatorKind,
    operands: Vec<ActionHolder>,
    result: Boolean,
    state: ActionState,
}

impl Combinator {
    pub fn and(operands: &[ActionId]) -> Self {
        Self::new(CombinatorKind::And, operands)
    }
    pub fn or(operands: &[ActionId]) -> Self {
        Self::new(CombinatorKind::Or, operands)
    }
    pub fn not(operand: ActionId) -> Self {
        Self::new(CombinatorKind::Not, &[operand])
    }
    pub fn new(kind: CombinatorKind, operands: &[ActionId]) -> Self {
        Self {
            kind,
            operands: operands.iter().map(|id| ActionHolder::new(*id)).collect(),
            result: Boolean::Unknown,
            state: ActionState::default(),
        }
    }

    // runs one operand and reads its tri-valued answer
    fn evaluate(
        operand: &ActionHolder,
        ctx: &mut ExecutionContext,
        control: &mut ListControl,
    ) -> Result<Boolean> {
        let mut action = operand.lock()?;
        let status = action.execute(ctx, control)?;
        let value = action.predicate_value().ok_or_else(|| {
            KernelError::unexpected(format!("operand #{} is not a predicate", operand.id().index()))
        })?;
        Ok(match status {
            Status::Success => Boolean::True,
            _ => value,
        })
    }

    fn compute(&self, ctx: &mut ExecutionContext, control: &mut ListControl) -> Result<Boolean> {
        match self.kind {
            CombinatorKind::And => {
                let mut value = Boolean::True;
                for operand in &self.operands {
                    value = bool_and(value, Self::evaluate(operand, ctx, control)?);
                    if value == Boolean::False {
                        break;
                    }
                }
                Ok(value)
            }
            CombinatorKind::Or => {
                let mut value = Boolean::False;
                for operand in &self.operands {
                    value = bool_or(value, Self::evaluate(operand, ctx, control)?);
                    if value == Boolean::True {
                        break;
                    }
                }
                Ok(value)
            }
            CombinatorKind::Not => {
                let operand = self
                    .operands
                    .first()
                    .ok_or_else(|| KernelError::unexpected("not without operand"))?;
                Ok(bool_not(Self::evaluate(operand, ctx, control)?))
            }
        }
    }

    fn for_operands(
        &self,
        ctx: &mut ExecutionContext,
        f: fn(&mut dyn Action, &mut ExecutionContext) -> Result<()>,
    ) -> Result<()> {
        for operand in &self.operands {
            if operand.is_initialized() {
                f(&mut **operand.lock()?, ctx)?;
            }
        }
        Ok(())
    }
}

impl Action for Combinator {
    fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain) {
        let separator = match self.kind {
            CombinatorKind::And => " and ",
            CombinatorKind::Or => " or ",
            CombinatorKind::Not => {
                explain.put("not ");
                ""
            }
        };
        explain.put("(");
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                explain.put(separator);
            }
            explain_action(ctx, operand.id(), explain);
        }
        explain.put(")");
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        for operand in &mut self.operands {
            operand.initialize(ctx)?;
        }
        Ok(())
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        for operand in &mut self.operands {
            operand.terminate(ctx)?;
        }
        Ok(())
    }
    fn execute(&mut self, ctx: &mut ExecutionContext, control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            self.result = self.compute(ctx, control)?;
            self.state.done(self.result.to_status());
        }
        Ok(self.state.status())
    }
    fn reset(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.result = Boolean::Unknown;
        self.state.clear();
        self.for_operands(ctx, |action, ctx| action.reset(ctx))
    }
    fn undone(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.result = Boolean::Unknown;
        self.state.clear();
        self.for_operands(ctx, |action, ctx| action.undone(ctx))
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn predicate_value(&self) -> Option<Boolean> {
        Some(self.result)
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::Combinator {
            kind: self.kind,
            operands: self.operands.iter().map(|h| h.id()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_translation() {
        let re = compile_like("a%c_", None, false).unwrap();
        assert!(re.is_match("abbbcd"));
        assert!(!re.is_match("abbbc"));
        let re = compile_like("100!%", Some('!'), false).unwrap();
        assert!(re.is_match("100%"));
        assert!(!re.is_match("1000"));
        assert!(compile_like("abc!", Some('!'), false).is_err());
    }
}
