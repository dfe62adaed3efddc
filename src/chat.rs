//! Interactive chat loop.
//!
//! Reads lines from the terminal, sends each one to Ollama together
//! with the conversation so far, and prints the reply. The loop runs
//! until the user types `quit` or closes the input.

use anyhow::{bail, Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use tracing::debug;

use crate::config::{ChatSettings, Config, Persona};
use crate::ollama::{
    clean_reply, model_available, ChatMessage, ChatOptions, ChatRequest, OllamaClient, OllamaError,
};
use crate::transcript::Transcript;

const EXIT_KEYWORD: &str = "quit";

/// True when the line asks to end the session, ignoring case and
/// surrounding whitespace.
pub fn is_exit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(EXIT_KEYWORD)
}

/// One conversation with one persona.
///
/// The transcript is only updated after an exchange fully succeeds, so
/// a failed request never leaves a dangling user turn behind.
pub struct ChatSession {
    client: OllamaClient,
    model: String,
    system_prompt: Option<String>,
    settings: ChatSettings,
    transcript: Transcript,
}

impl ChatSession {
    pub fn new(client: OllamaClient, persona: &Persona, settings: ChatSettings) -> Self {
        Self {
            client,
            model: persona.model.clone(),
            system_prompt: persona.system_prompt.clone(),
            settings,
            transcript: Transcript::new(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Build the wire message list for one exchange without touching
    /// the transcript: system prompt, history, then the new input.
    fn outgoing(&self, input: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.transcript.len() + 2);
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(self.transcript.turns().iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(input));
        messages
    }

    fn request(&self, input: &str, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: self.outgoing(input),
            stream,
            options: ChatOptions {
                temperature: self.settings.temperature,
            },
        }
    }

    /// Record a successful exchange. The reply is cleaned of think
    /// blocks before it enters the transcript.
    fn commit(&mut self, input: &str, reply: &str) -> String {
        let cleaned = clean_reply(reply);
        self.transcript.push_user(input);
        self.transcript.push_assistant(cleaned.clone());
        cleaned
    }

    /// Send one message and return the cleaned reply.
    pub async fn send(&mut self, input: &str) -> Result<String, OllamaError> {
        let request = self.request(input, false);
        let reply = self.client.chat(&request).await?;
        Ok(self.commit(input, &reply))
    }

    /// Send one message with streaming, handing each token to
    /// `on_token` as it arrives. Returns the cleaned reply.
    pub async fn send_streamed(
        &mut self,
        input: &str,
        on_token: impl FnMut(&str),
    ) -> Result<String, OllamaError> {
        let request = self.request(input, true);
        let reply = self.client.chat_stream(&request, on_token).await?;
        Ok(self.commit(input, &reply))
    }
}

/// Run the interactive chat loop until the user quits.
pub async fn run(config: Config) -> Result<()> {
    let client = OllamaClient::new(config.host.clone());
    let models = client
        .list_models()
        .await
        .with_context(|| format!("Failed to reach Ollama at {}", client.host()))?;

    let mut rl = DefaultEditor::new()?;
    let (name, persona) = choose_persona(&config, &mut rl)?;
    if !model_available(&models, &persona.model) {
        bail!(
            "model '{}' is not available; pull it with: ollama pull {}",
            persona.model,
            persona.model
        );
    }
    debug!(persona = %name, model = %persona.model, "starting chat session");

    println!(
        "Chatting as '{}' ({}). Type 'quit' to exit.",
        name, persona.model
    );
    let stream = config.chat.stream;
    let mut session = ChatSession::new(client, &persona, config.chat);

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                if is_exit(&line) {
                    break;
                }
                let _ = rl.add_history_entry(line.as_str());
                run_exchange(&mut session, &line, stream).await;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    debug!(turns = session.transcript().len(), "chat session ended");
    Ok(())
}

/// Pick the persona for this session. With a single persona there is
/// nothing to ask; otherwise list them and prompt, falling back to the
/// default on an empty or unknown answer.
fn choose_persona(config: &Config, rl: &mut DefaultEditor) -> Result<(String, Persona)> {
    if config.personas.is_empty() {
        bail!("no personas configured; run `ochat config` to add one");
    }
    if config.personas.len() == 1 {
        return resolve_persona(config, "");
    }

    println!("Available personas:");
    for (name, persona) in &config.personas {
        println!("  {} ({})", name, persona.model);
    }
    let prompt = format!("Choose a persona (Enter for '{}'): ", config.default_persona);
    let choice = match rl.readline(&prompt) {
        Ok(line) => line,
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => String::new(),
        Err(err) => return Err(err.into()),
    };
    resolve_persona(config, &choice)
}

fn resolve_persona(config: &Config, choice: &str) -> Result<(String, Persona)> {
    let choice = choice.trim();
    if !choice.is_empty() {
        if let Some(persona) = config.personas.get(choice) {
            return Ok((choice.to_string(), persona.clone()));
        }
        eprintln!(
            "Unknown persona '{}', using '{}'",
            choice, config.default_persona
        );
    }
    if let Some(persona) = config.personas.get(&config.default_persona) {
        return Ok((config.default_persona.clone(), persona.clone()));
    }
    let (name, persona) = config
        .personas
        .iter()
        .next()
        .context("no personas configured")?;
    Ok((name.clone(), persona.clone()))
}

/// Run one exchange and report the outcome. Errors are printed, not
/// propagated: a failed exchange never ends the session.
async fn run_exchange(session: &mut ChatSession, line: &str, stream: bool) {
    let result = if stream {
        let result = session
            .send_streamed(line, |token| {
                print!("{token}");
                let _ = io::stdout().flush();
            })
            .await;
        println!();
        result
    } else {
        session.send(line).await
    };

    match result {
        Ok(reply) => {
            if !stream {
                println!("{reply}");
            }
        }
        Err(e) => eprintln!("Error: {e}"),
    }
}
