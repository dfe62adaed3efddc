//! Multi-agent panel chat.
//!
//! Several personas answer the same input side by side. Requests fan
//! out concurrently, but replies always print in agent order, as whole
//! messages, once every agent has answered.

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use crate::chat::{is_exit, ChatSession};
use crate::config::Config;
use crate::ollama::{model_available, OllamaClient, OllamaError};

/// One panel member: a persona name and its private conversation.
pub struct Agent {
    pub name: String,
    pub session: ChatSession,
}

pub struct AgentPanel {
    agents: Vec<Agent>,
}

impl AgentPanel {
    /// Build one agent per selected persona. Each agent keeps its own
    /// transcript and never sees another agent's conversation.
    pub fn new(client: &OllamaClient, config: &Config, selected: &[String]) -> Self {
        let agents = selected
            .iter()
            .filter_map(|name| {
                config.personas.get(name).map(|persona| Agent {
                    name: name.clone(),
                    session: ChatSession::new(client.clone(), persona, config.chat.clone()),
                })
            })
            .collect();
        Self { agents }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Send the input to every agent concurrently. Results come back in
    /// agent order no matter which reply finished first. An agent that
    /// fails leaves its own transcript unchanged and does not disturb
    /// the others.
    pub async fn broadcast(&mut self, input: &str) -> Vec<(String, Result<String, OllamaError>)> {
        join_all(self.agents.iter_mut().map(|agent| async move {
            let result = agent.session.send(input).await;
            (agent.name.clone(), result)
        }))
        .await
    }
}

/// Expand the selection line into persona names. Empty input or `all`
/// selects every persona; otherwise the line is a comma-separated list,
/// with unknown names reported and skipped.
fn parse_selection(config: &Config, line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("all") {
        return config.personas.keys().cloned().collect();
    }
    let mut selected = Vec::new();
    for raw in line.split(',') {
        let name = raw.trim();
        if name.is_empty() {
            continue;
        }
        if !config.personas.contains_key(name) {
            eprintln!("{}: persona not found", name);
            continue;
        }
        if !selected.iter().any(|s| s == name) {
            selected.push(name.to_string());
        }
    }
    selected
}

/// Run the panel loop until the user quits.
pub async fn run(config: Config) -> Result<()> {
    if config.personas.is_empty() {
        bail!("no personas configured; run `ochat config` to add one");
    }

    let client = OllamaClient::new(config.host.clone());
    let models = client
        .list_models()
        .await
        .with_context(|| format!("Failed to reach Ollama at {}", client.host()))?;

    println!("Available personas:");
    for (name, persona) in &config.personas {
        println!("  {} ({})", name, persona.model);
    }

    let mut rl = DefaultEditor::new()?;
    let line = match rl.readline("Choose agents (comma-separated, Enter for all): ") {
        Ok(line) => line,
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    let selected = parse_selection(&config, &line);
    if selected.is_empty() {
        bail!("no agents selected");
    }
    for name in &selected {
        if let Some(persona) = config.personas.get(name) {
            if !model_available(&models, &persona.model) {
                bail!(
                    "model '{}' is not available; pull it with: ollama pull {}",
                    persona.model,
                    persona.model
                );
            }
        }
    }
    debug!(agents = selected.len(), "starting panel session");

    let mut panel = AgentPanel::new(&client, &config, &selected);
    let roster: Vec<&str> = panel.agents().iter().map(|a| a.name.as_str()).collect();
    println!("Chatting with {}. Type 'quit' to exit.", roster.join(", "));

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                if is_exit(&line) {
                    break;
                }
                let _ = rl.add_history_entry(line.as_str());
                for (name, result) in panel.broadcast(&line).await {
                    match result {
                        Ok(reply) => println!("{name}: {reply}"),
                        Err(e) => eprintln!("{name}: error: {e}"),
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Persona;
    use mockito::Matcher;

    fn two_persona_config() -> Config {
        let mut config = Config::default();
        config.personas.clear();
        config.personas.insert(
            "alpha".to_string(),
            Persona {
                model: "model-a".to_string(),
                system_prompt: None,
            },
        );
        config.personas.insert(
            "beta".to_string(),
            Persona {
                model: "model-b".to_string(),
                system_prompt: None,
            },
        );
        config
    }

    #[test]
    fn test_parse_selection_empty_selects_all() {
        let config = two_persona_config();
        assert_eq!(parse_selection(&config, ""), vec!["alpha", "beta"]);
        assert_eq!(parse_selection(&config, "all"), vec!["alpha", "beta"]);
        assert_eq!(parse_selection(&config, "ALL"), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_parse_selection_trims_and_dedups() {
        let config = two_persona_config();
        assert_eq!(
            parse_selection(&config, " alpha , beta , alpha "),
            vec!["alpha", "beta"]
        );
    }

    #[test]
    fn test_parse_selection_skips_unknown() {
        let config = two_persona_config();
        assert_eq!(parse_selection(&config, "alpha, ghost"), vec!["alpha"]);
        assert!(parse_selection(&config, "ghost").is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":{"role":"assistant","content":"hi there"},"done":true}"#)
            .expect(2)
            .create();

        let config = two_persona_config();
        let client = OllamaClient::new(server.url());
        let selected = vec!["alpha".to_string(), "beta".to_string()];
        let mut panel = AgentPanel::new(&client, &config, &selected);

        let results = panel.broadcast("hello").await;

        mock.assert();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "alpha");
        assert_eq!(results[1].0, "beta");
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(panel
            .agents()
            .iter()
            .all(|a| a.session.transcript().len() == 2));
    }

    #[tokio::test]
    async fn test_one_failing_agent_does_not_affect_others() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::Regex("model-a".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":{"role":"assistant","content":"fine"},"done":true}"#)
            .create();
        let fail = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::Regex("model-b".to_string()))
            .with_status(500)
            .with_body(r#"{"error":"boom"}"#)
            .create();

        let config = two_persona_config();
        let client = OllamaClient::new(server.url());
        let selected = vec!["alpha".to_string(), "beta".to_string()];
        let mut panel = AgentPanel::new(&client, &config, &selected);

        let results = panel.broadcast("hello").await;

        ok.assert();
        fail.assert();
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        let agents = panel.agents();
        assert_eq!(agents[0].session.transcript().len(), 2);
        assert!(agents[1].session.transcript().is_empty());
    }
}
