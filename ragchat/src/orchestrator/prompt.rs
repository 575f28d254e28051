use shared_types::Message;

use crate::gateway::{Prompt, Turn};

pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are a helpful research assistant. Answer questions based on the provided market research data. \
If the answer is not found in the provided context, clearly state that you don't have the information. \
Keep your answers concise and directly related to the user's question and provided context. \
Do not make up information. If the context is insufficient, say so.";

/// Stored as the model reply when generation fails or times out.
pub const GENERATION_FAILED_REPLY: &str =
    "I'm sorry, I encountered an error while processing your request.";

/// Stored as the model reply when generation succeeds with nothing usable.
pub const EMPTY_OUTPUT_REPLY: &str =
    "I received an empty or non-text response, please try rephrasing your question.";

fn final_user_turn(context: &str, question: &str) -> String {
    if context.is_empty() {
        format!(
            "Based on our previous conversation (if any), and noting that I couldn't find specific documents for your current question, please answer: {question}"
        )
    } else {
        format!(
            "Based on our previous conversation and the following potentially relevant context from the research data:\n\n--- CONTEXT START ---\n{context}\n--- CONTEXT END ---\n\nNow, please answer my question: {question}"
        )
    }
}

/// `history` must be oldest first and must not contain the message being answered.
pub fn build_prompt(history: &[Message], context: &str, question: &str) -> Prompt {
    let mut turns: Vec<Turn> = history
        .iter()
        .map(|m| Turn {
            role: m.sender.into(),
            text: m.content.clone(),
        })
        .collect();
    turns.push(Turn::user(final_user_turn(context, question)));

    Prompt {
        system: CHAT_SYSTEM_INSTRUCTION.to_string(),
        turns,
    }
}
