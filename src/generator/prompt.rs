//! System prompts and chat message assembly for the interviewer persona.

use super::GenerationRequest;
use crate::interview::{Difficulty, InterviewCategory};
use crate::session::transcript::Role;
use serde::Serialize;

/// One message in an OpenAI-compatible chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Interviewer persona for each category.
pub fn persona(category: InterviewCategory) -> &'static str {
    match category {
        InterviewCategory::Technical => {
            "You are a strict Senior Software Architect. Ask deep technical questions. \
             Be concise. Do not be overly friendly."
        }
        InterviewCategory::Hr => {
            "You are a professional HR Manager. Focus on behavioral questions using the STAR method."
        }
        InterviewCategory::Managerial => {
            "You are a VP of Engineering. Focus on leadership and conflict resolution."
        }
        InterviewCategory::SystemDesign => {
            "You are a Lead Engineer focusing on scalability and architecture. \
             Maintain a professional tone."
        }
        InterviewCategory::DsaPractice => {
            "You are an expert DSA tutor. Pose one data structures or algorithms problem \
             at a time, probe the candidate's approach and complexity, and give hints \
             rather than full solutions."
        }
    }
}

fn difficulty_guidance(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "Keep questions at an entry level and be encouraging.",
        Difficulty::Medium => "Ask questions suitable for a mid-level candidate.",
        Difficulty::Hard => "Ask challenging, senior-level questions and press on weak answers.",
    }
}

/// Full system prompt: persona, difficulty guidance, optional topic focus and a
/// brevity rule (replies are read out loud by the client).
pub fn system_prompt(
    category: InterviewCategory,
    difficulty: Difficulty,
    topic: Option<&str>,
) -> String {
    let mut prompt = format!("{} {}", persona(category), difficulty_guidance(difficulty));
    if let Some(topic) = topic {
        prompt.push_str(&format!(" Focus the interview on: {}.", topic));
    }
    prompt.push_str(" Keep every reply short enough to be spoken aloud and ask one question at a time.");
    prompt
}

/// Messages for one completion: the system prompt followed by every turn in order.
pub fn build_messages(request: &GenerationRequest<'_>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.transcript.len() + 1);
    messages.push(ChatMessage {
        role: "system",
        content: system_prompt(request.category, request.difficulty, request.topic),
    });
    messages.extend(request.transcript.turns().iter().map(|turn| ChatMessage {
        role: match turn.role {
            Role::Assistant => "assistant",
            Role::User => "user",
        },
        content: turn.content.clone(),
    }));
    messages
}
