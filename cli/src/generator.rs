//! Rule-based step generator for offline runs.
//!
//! Proposes a fixed four-stage reasoning script: restate, identify, compute,
//! conclude. Two-operand arithmetic questions ("What is 15 + 27?") get real
//! numbers in every stage; anything else gets generic steps.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use ponder_core::agents::wants_thai;
use ponder_core::{ReasoningResult, StepGenerator};
use regex::Regex;

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("number pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Add,
    Subtract,
    Multiply,
}

impl Operation {
    fn detect(query: &str) -> Option<Self> {
        let lowered = query.to_lowercase();
        if mentions(&lowered, &["+", "plus", "sum", "add", "ผลรวม", "บวก"]) {
            Some(Operation::Add)
        } else if mentions(&lowered, &["*", "×", "times", "product", "multipl", "คูณ"]) {
            Some(Operation::Multiply)
        } else if mentions(&lowered, &[" - ", "minus", "difference", "subtract", "ลบ"]) {
            Some(Operation::Subtract)
        } else {
            None
        }
    }

    fn apply(self, a: i64, b: i64) -> Option<i64> {
        match self {
            Operation::Add => a.checked_add(b),
            Operation::Subtract => a.checked_sub(b),
            Operation::Multiply => a.checked_mul(b),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Operation::Add => "+",
            Operation::Subtract => "-",
            Operation::Multiply => "*",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Operation::Add => "addition",
            Operation::Subtract => "subtraction",
            Operation::Multiply => "multiplication",
        }
    }
}

fn mentions(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// A solved two-operand problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Arithmetic {
    a: i64,
    b: i64,
    op: Operation,
    result: i64,
}

impl Arithmetic {
    fn parse(query: &str) -> Option<Self> {
        let op = Operation::detect(query)?;
        let mut numbers = NUMBER.find_iter(query).filter_map(|m| m.as_str().parse().ok());
        let a = numbers.next()?;
        let b = numbers.next()?;
        let result = op.apply(a, b)?;
        Some(Self { a, b, op, result })
    }
}

/// Scripted stand-in for a model-backed generator.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator;

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Candidates for the step after `path`; empty once the script is done.
    pub fn candidates(&self, query: &str, path: &[String]) -> Vec<String> {
        let problem = Arithmetic::parse(query);
        match (path.len(), problem) {
            (0, _) => vec![
                format!("Restate the question in English: {}", query),
                format!("Let's identify what is being asked: {}", query),
            ],
            (1, Some(p)) => vec![
                format!("Step 1: Identify the numbers: n1={}, n2={}.", p.a, p.b),
                format!("Step 1: Check the operation: {} required.", p.op.name()),
            ],
            (1, None) => vec![
                "Step 1: Split the question into smaller parts.".to_string(),
                "Step 1: Recall the facts the question depends on.".to_string(),
            ],
            (2, Some(p)) => vec![
                format!(
                    "Step 2: Perform the calculation: {} {} {} = {}.",
                    p.a,
                    p.op.symbol(),
                    p.b,
                    p.result
                ),
                format!("Step 2: Verify the {}: the result is {}.", p.op.name(), p.result),
            ],
            (2, None) => vec!["Step 2: Combine the parts into one line of reasoning.".to_string()],
            (3, problem) => vec![conclusion(query, problem)],
            _ => Vec::new(),
        }
    }
}

fn conclusion(query: &str, problem: Option<Arithmetic>) -> String {
    match (problem, wants_thai(query)) {
        (Some(p), true) => format!(
            "Conclusion: therefore the result is {}. แปลเป็นไทยคือ 'ผลลัพธ์คือ {}'",
            p.result, p.result
        ),
        (Some(p), false) => format!("Conclusion: therefore the result is {}.", p.result),
        (None, _) => "Conclusion: therefore the answer follows from the steps above.".to_string(),
    }
}

#[async_trait]
impl StepGenerator for ScriptedGenerator {
    async fn generate(&self, query: &str, path: &[String]) -> ReasoningResult<Vec<String>> {
        Ok(self.candidates(query, path))
    }
}
