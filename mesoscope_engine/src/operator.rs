//! Operator prompt capability (§9: "Operator `input()` prompts as the
//! sole synchronous rendezvous → a `Prompt` capability with `echo`,
//! `ask`, `ask_yes_no`, `wait_for_enter`; tests can inject a scripted
//! prompt"). Every interactive step in the startup/runtime/shutdown
//! sequence goes through this trait instead of calling `std::io`
//! directly, so tests can run the engine end-to-end without a
//! terminal.

use std::io::Write;

pub trait Operator: Send {
    fn echo(&mut self, message: &str);
    fn ask(&mut self, question: &str) -> String;
    fn ask_yes_no(&mut self, question: &str) -> bool;
    fn wait_for_enter(&mut self, message: &str);
}

/// Real terminal operator: reads from stdin, writes to stdout.
pub struct StdioOperator;

impl Operator for StdioOperator {
    fn echo(&mut self, message: &str) {
        println!("{message}");
    }

    fn ask(&mut self, question: &str) -> String {
        print!("{question} ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        line.trim().to_string()
    }

    fn ask_yes_no(&mut self, question: &str) -> bool {
        let answer = self.ask(&format!("{question} [y/n]")).to_lowercase();
        answer == "y" || answer == "yes"
    }

    fn wait_for_enter(&mut self, message: &str) {
        print!("{message} ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    }
}

/// Scripted operator for tests (§E "tests can inject a scripted
/// prompt"): pre-seeded answers, consumed in order. Panics if a
/// question is asked beyond the script, which catches tests that
/// under-specify operator interaction.
#[derive(Default)]
pub struct ScriptedOperator {
    pub yes_no_answers: std::collections::VecDeque<bool>,
    pub text_answers: std::collections::VecDeque<String>,
    pub echoed: Vec<String>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_yes_no(mut self, answer: bool) -> Self {
        self.yes_no_answers.push_back(answer);
        self
    }

    pub fn with_text(mut self, answer: impl Into<String>) -> Self {
        self.text_answers.push_back(answer.into());
        self
    }
}

impl Operator for ScriptedOperator {
    fn echo(&mut self, message: &str) {
        self.echoed.push(message.to_string());
    }

    fn ask(&mut self, question: &str) -> String {
        self.text_answers
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedOperator ran out of answers for: {question}"))
    }

    fn ask_yes_no(&mut self, question: &str) -> bool {
        self.yes_no_answers
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedOperator ran out of yes/no answers for: {question}"))
    }

    fn wait_for_enter(&mut self, message: &str) {
        self.echoed.push(message.to_string());
    }
}
