//! Terminal rendering of the conversation

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Mutex;

use colored::{Color, Colorize};

use colloquy_core::{ChatDocument, Entity, OutputSink};

/// Colours handed out to senders in order of first appearance
const PALETTE: &[Color] = &[
    Color::Cyan,
    Color::Green,
    Color::Magenta,
    Color::Blue,
    Color::Yellow,
];

struct ConsoleState<W> {
    out: W,
    colors: HashMap<String, Color>,
    /// Sender whose reply is currently being streamed
    streaming: Option<String>,
}

impl<W> ConsoleState<W> {
    fn color_for(&mut self, sender: &str) -> Color {
        let next = PALETTE[self.colors.len() % PALETTE.len()];
        *self.colors.entry(sender.to_string()).or_insert(next)
    }
}

/// Prints streamed deltas as they arrive and every accepted message once
pub struct ConsoleSink<W = io::Stdout> {
    state: Mutex<ConsoleState<W>>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(ConsoleState {
                out,
                colors: HashMap::new(),
                streaming: None,
            }),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.state.into_inner() {
            Ok(state) => state.out,
            Err(poisoned) => poisoned.into_inner().out,
        }
    }
}

fn header(msg: &ChatDocument) -> String {
    match &msg.recipient {
        Some(to) => format!("{} → {}", msg.sender_name, to),
        None => msg.sender_name.clone(),
    }
}

impl<W: Write + Send> OutputSink for ConsoleSink<W> {
    fn on_delta(&self, sender: &str, text: &str) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let color = state.color_for(sender);
        if state.streaming.as_deref() != Some(sender) {
            if state.streaming.is_some() {
                let _ = writeln!(state.out);
            }
            let _ = write!(state.out, "\n{}: ", sender.color(color).bold());
            state.streaming = Some(sender.to_string());
        }
        let _ = write!(state.out, "{}", text.color(color));
        let _ = state.out.flush();
    }

    fn on_message(&self, msg: &ChatDocument) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        // the streamed text already showed this reply
        if state.streaming.take().as_deref() == Some(msg.sender_name.as_str()) {
            let _ = writeln!(state.out);
            let _ = state.out.flush();
            return;
        }

        let color = state.color_for(&msg.sender_name);
        let body = match msg.sender {
            Entity::Llm => msg.content.color(color),
            Entity::Agent | Entity::User => msg.content.dimmed(),
        };
        let _ = writeln!(state.out, "\n{}: {}", header(msg).color(color).bold(), body);
        let _ = state.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(sink: ConsoleSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_message_shows_sender_and_recipient() {
        let sink = ConsoleSink::new(Vec::new());
        let msg = ChatDocument::new("What is pretraining?", Entity::Llm, "Student")
            .with_recipient("TrainingExpert");
        sink.on_message(&msg);

        let out = rendered(sink);
        assert!(out.contains("Student → TrainingExpert"));
        assert!(out.contains("What is pretraining?"));
    }

    #[test]
    fn test_streamed_reply_is_not_repeated() {
        let sink = ConsoleSink::new(Vec::new());
        sink.on_delta("TrainingExpert", "Learning ");
        sink.on_delta("TrainingExpert", "from text.");
        sink.on_message(&ChatDocument::new(
            "Learning from text.",
            Entity::Llm,
            "TrainingExpert",
        ));

        let out = rendered(sink);
        assert_eq!(out.matches("TrainingExpert").count(), 1);
        assert!(out.contains("Learning "));
        assert!(out.contains("from text."));
    }

    #[test]
    fn test_switching_streams_starts_new_line() {
        let sink = ConsoleSink::new(Vec::new());
        sink.on_delta("Student", "question");
        sink.on_delta("TrainingExpert", "answer");
        let out = rendered(sink);
        assert_eq!(out.matches("Student").count(), 1);
        assert_eq!(out.matches("TrainingExpert").count(), 1);
    }

    #[test]
    fn test_colors_are_stable_per_sender() {
        let mut state = ConsoleState {
            out: Vec::<u8>::new(),
            colors: HashMap::new(),
            streaming: None,
        };
        let a = state.color_for("Student");
        let b = state.color_for("TrainingExpert");
        assert_ne!(a, b);
        assert_eq!(state.color_for("Student"), a);
    }
}
