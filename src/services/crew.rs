//! Declarative research crews: a fixed cast of agents working through an
//! ordered list of tasks, each task an LLM-with-tools run through the
//! [`AgentEngine`]. Later tasks see the output of every earlier one.

use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::models::CrewInput;
use crate::services::agent::tools::{COMPETITOR_VERIFIER, DISTANCE_CALCULATOR, POPULATION_LOOKUP, WEB_SEARCH};
use crate::services::agent::{AgentEngine, AgentError, LLMProvider, ToolRegistry};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentSpec {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskSpec {
    pub description: &'static str,
    pub expected_output: &'static str,
    /// Index into the crew's agents.
    pub agent: usize,
    pub tools: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    Sequential,
}

#[derive(Debug, Clone, Serialize)]
pub struct Crew {
    pub name: &'static str,
    pub agents: Vec<AgentSpec>,
    pub tasks: Vec<TaskSpec>,
    pub process: Process,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CrewKind {
    Competitor,
    Opportunity,
}

impl CrewKind {
    pub fn crew(&self) -> Crew {
        match self {
            CrewKind::Competitor => competitor_crew(),
            CrewKind::Opportunity => opportunity_crew(),
        }
    }
}

const DEALERSHIP_INFO_AGENT: AgentSpec = AgentSpec {
    role: "Dealership Info Gatherer",
    goal: "Collect key information about the target car dealership {dealership} with a zipcode {zipcode}.",
    backstory: "Expert researcher skilled at finding dealership details.",
};

const DEALERSHIP_INFO_TASK: TaskSpec = TaskSpec {
    description: "Find the OEM, address, and coordinates of the dealership {dealership} with zipcode {zipcode}.",
    expected_output: "Dictionary with OEM, address, and coordinates.",
    agent: 0,
    tools: &[WEB_SEARCH],
};

const DATA_ORGANIZER_BACKSTORY: &str = "Data analyst experienced in formatting and cleaning information.";

pub fn competitor_crew() -> Crew {
    Crew {
        name: "competitor",
        agents: vec![
            DEALERSHIP_INFO_AGENT,
            AgentSpec {
                role: "Competitor Researcher",
                goal: "Identify competitor car dealerships for {dealership}.",
                backstory: "Market research specialist focused on car dealerships.",
            },
            AgentSpec {
                role: "Data Organizer",
                goal: "Structure competitor data into a table with dealership info.",
                backstory: DATA_ORGANIZER_BACKSTORY,
            },
            AgentSpec {
                role: "Results Supervisor",
                goal: "Validate dealership and competitor data for accuracy and quality.",
                backstory: "Quality assurance expert reviewing all information.",
            },
        ],
        tasks: vec![
            DEALERSHIP_INFO_TASK,
            TaskSpec {
                description: "Search competitors selling the same OEM within 100 miles of {dealership}. \
                              Use web_search to find them and distance_calculator to measure the distance \
                              in miles from the dealership.",
                expected_output: "List of competitors with name, website, address, city/state and distance.",
                agent: 1,
                tools: &[WEB_SEARCH, DISTANCE_CALCULATOR],
            },
            TaskSpec {
                description: "Organize competitor data into a structured table.",
                expected_output: "Markdown table: Name | Website | Distance | City | State.",
                agent: 2,
                tools: &[],
            },
            TaskSpec {
                description: "Verify all competitor data, check OEM, website, and existence. \
                              Use competitor_verifier on every competitor and drop the ones judged invalid.",
                expected_output: "Final summary with dealership info and validated competitor table.",
                agent: 3,
                tools: &[COMPETITOR_VERIFIER],
            },
        ],
        process: Process::Sequential,
    }
}

pub fn opportunity_crew() -> Crew {
    Crew {
        name: "opportunity",
        agents: vec![
            DEALERSHIP_INFO_AGENT,
            AgentSpec {
                role: "Opportunities Researcher",
                goal: "Using the dealership's {dealership} info, identify cities within 100 miles with population > 1000.",
                backstory: "Market research specialist for geographic business expansion.",
            },
            AgentSpec {
                role: "Data Organizer",
                goal: "Structure opportunity data into a readable table.",
                backstory: DATA_ORGANIZER_BACKSTORY,
            },
            AgentSpec {
                role: "Results Supervisor",
                goal: "Validate all opportunity data and present final structured output.",
                backstory: "Quality assurance expert reviewing all opportunity recommendations.",
            },
        ],
        tasks: vec![
            DEALERSHIP_INFO_TASK,
            TaskSpec {
                description: "Using the OEM, address, state and location of the dealership {dealership}, look for \
                              nearby cities and/or metro areas within a 100-mile radius and with population greater \
                              than 1000 people. Use web_search to find city names, their states and addresses. \
                              Use population_lookup to verify each city has a population > 1000. \
                              Use distance_calculator for distances in miles. \
                              Return a list of valid cities with their City/Town Name, Distance from dealer, and State.",
                expected_output: "A list of dictionaries: Nearby City/Town Name, Distance From Dealer, State.",
                agent: 1,
                tools: &[WEB_SEARCH, DISTANCE_CALCULATOR, POPULATION_LOOKUP],
            },
            TaskSpec {
                description: "Take the list of nearby cities and organize the data into a markdown table.",
                expected_output: "Markdown table: City | Distance | State.",
                agent: 2,
                tools: &[],
            },
            TaskSpec {
                description: "Review the dealership info and nearby city suggestions, and present the results clearly.",
                expected_output: "Final structured summary with dealership and opportunity info.",
                agent: 3,
                tools: &[],
            },
        ],
        process: Process::Sequential,
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"))
}

/// Replace `{field}` with the matching input. Unknown fields stay as written.
pub fn interpolate(template: &str, inputs: &[(&str, &str)]) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            inputs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn agent_prompt(agent: &AgentSpec, inputs: &[(&str, &str)]) -> String {
    format!(
        "You are {}. {}\nYour personal goal is: {}",
        agent.role,
        interpolate(agent.backstory, inputs),
        interpolate(agent.goal, inputs)
    )
}

pub fn task_prompt(task: &TaskSpec, inputs: &[(&str, &str)], context: &[String]) -> String {
    let mut prompt = format!(
        "Current Task: {}\n\nThis is the expected criteria for your final answer: {}",
        interpolate(task.description, inputs),
        interpolate(task.expected_output, inputs)
    );

    if !context.is_empty() {
        prompt.push_str("\n\nThis is the context you're working with:\n");
        prompt.push_str(&context.join("\n\n----------\n\n"));
    }

    prompt.push_str(
        "\n\nBegin! Use the available tools when they help, and reply with your complete final answer.",
    );
    prompt
}

/// Runs crews against a shared LLM provider and tool set.
pub struct CrewService {
    provider: Option<Arc<dyn LLMProvider>>,
    unavailable_reason: String,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
}

impl CrewService {
    pub fn new(provider: Arc<dyn LLMProvider>, tools: Arc<ToolRegistry>, max_iterations: usize) -> Self {
        Self {
            provider: Some(provider),
            unavailable_reason: String::new(),
            tools,
            max_iterations,
        }
    }

    /// A service that answers every run with `MissingCredentials`.
    pub fn without_provider(reason: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider: None,
            unavailable_reason: reason.into(),
            tools,
            max_iterations: 0,
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub async fn run(&self, kind: CrewKind, input: &CrewInput) -> Result<String, AgentError> {
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| AgentError::MissingCredentials(self.unavailable_reason.clone()))?;

        self.kickoff(&kind.crew(), provider, input).await
    }

    async fn kickoff(
        &self,
        crew: &Crew,
        provider: Arc<dyn LLMProvider>,
        input: &CrewInput,
    ) -> Result<String, AgentError> {
        let inputs = input.as_pairs();
        let started = Instant::now();
        log::info!("Starting {} crew for {} ({})", crew.name, input.dealership, input.zipcode);

        let mut outputs: Vec<String> = Vec::with_capacity(crew.tasks.len());
        for (index, task) in crew.tasks.iter().enumerate() {
            let agent = crew.agents.get(task.agent).ok_or_else(|| {
                AgentError::Provider(format!("Task {} references missing agent {}", index, task.agent))
            })?;

            log::info!(
                "[{} crew] task {}/{} assigned to {}",
                crew.name,
                index + 1,
                crew.tasks.len(),
                agent.role
            );

            let tools = Arc::new(self.tools.subset(task.tools));
            let engine = AgentEngine::new(provider.clone(), tools).with_max_iterations(self.max_iterations);
            let output = engine
                .process_message(
                    Some(agent_prompt(agent, &inputs)),
                    task_prompt(task, &inputs, &outputs),
                    vec![],
                )
                .await?;
            outputs.push(output);
        }

        log::info!(
            "Finished {} crew for {} in {:.1}s",
            crew.name,
            input.dealership,
            started.elapsed().as_secs_f64()
        );

        Ok(outputs.pop().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::agent::provider::{AgentResponse, Message, ToolCall};
    use crate::services::agent::tools::ToolDefinition;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingProvider {
        calls: Mutex<Vec<(Vec<Message>, Vec<String>)>>,
    }

    #[async_trait]
    impl LLMProvider for RecordingProvider {
        async fn generate(
            &self,
            messages: Vec<Message>,
            tools: Option<Vec<ToolDefinition>>,
        ) -> Result<AgentResponse, AgentError> {
            let tool_names = tools
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.name)
                .collect();
            let mut calls = self.calls.lock().unwrap();
            calls.push((messages, tool_names));
            Ok(AgentResponse {
                content: format!("output {}", calls.len()),
                tool_calls: Vec::<ToolCall>::new(),
                finish_reason: "stop".to_string(),
            })
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl crate::services::agent::Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }

        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>> {
            Ok(serde_json::json!({}))
        }
    }

    fn input() -> CrewInput {
        CrewInput {
            zipcode: "90210".to_string(),
            dealership: "Sunset Toyota".to_string(),
            customer: "Acme Holdings".to_string(),
            person: "Jordan".to_string(),
        }
    }

    fn all_tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for name in [WEB_SEARCH, DISTANCE_CALCULATOR, POPULATION_LOOKUP, COMPETITOR_VERIFIER] {
            registry.register(Arc::new(NamedTool(name)));
        }
        Arc::new(registry)
    }

    #[test]
    fn test_interpolate() {
        let inputs = [("dealership", "Sunset Toyota"), ("zipcode", "90210")];
        assert_eq!(
            interpolate("Research {dealership} near {zipcode} for {unknown}.", &inputs),
            "Research Sunset Toyota near 90210 for {unknown}."
        );
    }

    #[test]
    fn test_crews_reference_valid_agents() {
        for crew in [competitor_crew(), opportunity_crew()] {
            assert_eq!(crew.process, Process::Sequential);
            assert_eq!(crew.tasks.len(), 4);
            for task in &crew.tasks {
                assert!(task.agent < crew.agents.len());
            }
        }
    }

    #[test]
    fn test_task_prompt_includes_context() {
        let crew = competitor_crew();
        let inputs = input();
        let prompt = task_prompt(&crew.tasks[1], &inputs.as_pairs(), &["dealer facts".to_string()]);
        assert!(prompt.contains("within 100 miles of Sunset Toyota"));
        assert!(prompt.contains("dealer facts"));
        assert!(!prompt.contains("{dealership}"));
    }

    #[tokio::test]
    async fn test_kickoff_runs_tasks_in_order_with_their_tools() {
        let provider = Arc::new(RecordingProvider { calls: Mutex::new(Vec::new()) });
        let service = CrewService::new(provider.clone(), all_tools(), 5);

        let result = service.run(CrewKind::Opportunity, &input()).await.unwrap();
        assert_eq!(result, "output 4");

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);

        let (first_messages, first_tools) = &calls[0];
        assert!(first_messages[0].content.contains("Dealership Info Gatherer"));
        assert!(first_messages[1].content.contains("Sunset Toyota with zipcode 90210"));
        assert_eq!(first_tools, &vec![WEB_SEARCH.to_string()]);

        let (_, research_tools) = &calls[1];
        assert_eq!(
            research_tools,
            &vec![
                DISTANCE_CALCULATOR.to_string(),
                POPULATION_LOOKUP.to_string(),
                WEB_SEARCH.to_string()
            ]
        );

        let (last_messages, last_tools) = &calls[3];
        assert!(last_tools.is_empty());
        let last_task = &last_messages[1].content;
        assert!(last_task.contains("output 1"));
        assert!(last_task.contains("output 3"));
    }

    #[tokio::test]
    async fn test_run_without_provider_reports_missing_credentials() {
        let service = CrewService::without_provider("GEMINI_API_KEY is not set", all_tools());
        let result = service.run(CrewKind::Competitor, &input()).await;
        assert!(matches!(result, Err(AgentError::MissingCredentials(msg)) if msg.contains("GEMINI")));
    }
}
