use std::io::{BufRead, Write as _};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};

use learning_os::config::Config;
use learning_os::error::{LearningOsError, Result};
use learning_os::explanations::ExplanationStore;
use learning_os::knowledge::{ItemType, KnowledgeStore};
use learning_os::planner::{PlanGenerator, PlanRequest};
use learning_os::plans::{MissionItem, MissionStatus, PlanItem, PlanStore};
use learning_os::providers::gemini::GeminiProvider;
use learning_os::ratelimit::RequestGate;
use learning_os::services::assistant::AssistantService;
use learning_os::session::{ChatRole, SessionContext};
use learning_os::tutor::{PracticeKind, Tutor};
use learning_os::usage::UsageStore;

#[derive(Parser, Debug)]
#[command(name = "learning-os")]
#[command(about = "AI study planner and tutor")]
struct Cli {
    /// Config file path (defaults to the platform config location)
    #[arg(long, env = "LEARNING_OS_CONFIG")]
    config: Option<String>,

    #[arg(long)]
    db: Option<String>,

    #[arg(long, default_value = "user")]
    user_id: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Study plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },
    /// Daily mission management
    Mission {
        #[command(subcommand)]
        command: MissionCommand,
    },
    /// Generate lesson content for the current (or a specific) mission
    Learn {
        #[arg(long)]
        plan: i32,
        #[arg(long)]
        mission: Option<i32>,
    },
    /// Generate practice material for a topic
    Practice {
        topic: String,
        #[arg(long, default_value = "quiz")]
        kind: String,
    },
    /// Ask the tutor a one-off question
    Ask {
        question: String,
        /// Save the answer for later review
        #[arg(long)]
        save: bool,
    },
    /// Interactive tutoring session
    Chat {
        #[arg(long)]
        plan: Option<i32>,
    },
    /// Knowledge base items (terms, concepts, snippets)
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommand,
    },
    /// Saved explanations
    Saved {
        #[command(subcommand)]
        command: SavedCommand,
    },
    /// Recent generation requests and their outcomes
    Usage {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Probe the configured API key with a minimal request
    ValidateKey,
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    /// Generate and store a new study plan
    Create {
        topic: String,
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long, default_value = "intermediate")]
        difficulty: String,
        #[arg(long, default_value_t = 2)]
        hours: i32,
        #[arg(long)]
        notes: Option<String>,
    },
    List,
    Show {
        id: i32,
    },
    Delete {
        id: i32,
    },
    /// Rework an existing plan from a natural-language request
    Adjust {
        id: i32,
        request: String,
    },
}

#[derive(Subcommand, Debug)]
enum MissionCommand {
    List {
        #[arg(long)]
        plan: i32,
    },
    /// Complete the current mission and promote the next day
    Advance {
        #[arg(long)]
        plan: i32,
    },
    SetStatus {
        id: i32,
        status: String,
    },
}

#[derive(Subcommand, Debug)]
enum KnowledgeCommand {
    Add {
        term: String,
        definition: String,
        #[arg(long, default_value = "concept")]
        item_type: String,
        #[arg(long)]
        plan: Option<i32>,
    },
    List {
        #[arg(long)]
        plan: Option<i32>,
    },
    Delete {
        id: i32,
    },
}

#[derive(Subcommand, Debug)]
enum SavedCommand {
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Delete {
        id: i32,
    },
}

struct App {
    config: Config,
    sqlite_path: String,
    user_id: String,
}

impl App {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(learning_os::runtime_paths::default_config_path);
        let config = Config::load_or_default(config_path)?;
        let sqlite_path = cli.db.clone().unwrap_or_else(|| config.sqlite_path());
        Ok(Self {
            config,
            sqlite_path,
            user_id: cli.user_id.clone(),
        })
    }

    async fn plans(&self) -> Result<PlanStore> {
        PlanStore::new(&self.sqlite_path).await
    }

    async fn knowledge(&self) -> Result<KnowledgeStore> {
        KnowledgeStore::new(&self.sqlite_path).await
    }

    async fn explanations(&self) -> Result<ExplanationStore> {
        ExplanationStore::new(&self.sqlite_path).await
    }

    async fn assistant(&self) -> Result<Arc<AssistantService>> {
        let api_key = self.config.resolve_api_key()?;
        let provider = GeminiProvider::new(
            api_key,
            Some(self.config.model()),
            Some(self.config.base_url()),
        );
        let limits = self.config.limits();
        let gate = RequestGate::new(limits.min_request_interval, limits.requests_per_minute);
        let usage = Arc::new(UsageStore::new(&self.sqlite_path).await?);
        Ok(Arc::new(AssistantService::new(
            Arc::new(provider),
            gate,
            usage,
        )))
    }

    async fn tutor(&self) -> Result<Tutor> {
        Ok(Tutor::new(self.assistant().await?))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    learning_os::logging::init_tracing("learning_os");
    let cli = Cli::parse();
    let app = App::new(&cli)?;

    match cli.command {
        Command::Plan { command } => run_plan(&app, command).await,
        Command::Mission { command } => run_mission(&app, command).await,
        Command::Learn { plan, mission } => run_learn(&app, plan, mission).await,
        Command::Practice { topic, kind } => run_practice(&app, &topic, &kind).await,
        Command::Ask { question, save } => run_ask(&app, &question, save).await,
        Command::Chat { plan } => run_chat(&app, plan).await,
        Command::Knowledge { command } => run_knowledge(&app, command).await,
        Command::Saved { command } => run_saved(&app, command).await,
        Command::Usage { limit } => run_usage(&app, limit).await,
        Command::ValidateKey => run_validate_key(&app).await,
    }
}

async fn run_plan(app: &App, command: PlanCommand) -> Result<()> {
    let store = app.plans().await?;
    match command {
        PlanCommand::Create {
            topic,
            days,
            difficulty,
            hours,
            notes,
        } => {
            let service = app.assistant().await?;
            let generator = PlanGenerator::new(service)
                .with_chunk_delay(app.config.limits().chunk_delay);
            let request = PlanRequest {
                topic,
                days,
                difficulty,
                hours_per_day: hours,
                extra_instructions: notes,
            };

            let outcome = generator.create_plan(&store, &app.user_id, &request).await?;
            println!(
                "Created plan #{}: {} ({} days, {})",
                outcome.plan.id,
                outcome.plan.learning_target,
                outcome.plan.total_days,
                outcome.plan.difficulty
            );
            if !outcome.missing_days.is_empty() {
                println!(
                    "Warning: no content was generated for days {:?}",
                    outcome.missing_days
                );
            }
            for mission in &outcome.missions {
                print_mission_line(mission);
            }
            Ok(())
        }
        PlanCommand::List => {
            let plans = store.list_plans(&app.user_id).await?;
            if plans.is_empty() {
                println!("No plans yet. Try: learning-os plan create \"Basics of SQL\" --days 3");
                return Ok(());
            }
            for plan in plans {
                println!(
                    "#{:<4} {:<40} {} days  {}  created {}",
                    plan.id,
                    plan.learning_target,
                    plan.total_days,
                    plan.difficulty,
                    format_ts(plan.created_at)
                );
            }
            Ok(())
        }
        PlanCommand::Show { id } => {
            let plan = store.get_plan(id).await?;
            println!(
                "Plan #{}: {} ({} days, {}, {}h/day)",
                plan.id, plan.learning_target, plan.total_days, plan.difficulty, plan.hours_per_day
            );
            for mission in store.list_missions(id).await? {
                print_mission_line(&mission);
                if !mission.description.is_empty() {
                    println!("         {}", mission.description);
                }
            }
            Ok(())
        }
        PlanCommand::Delete { id } => {
            if store.delete_plan(id).await? {
                println!("Deleted plan #{id}");
            } else {
                println!("No plan #{id}");
            }
            Ok(())
        }
        PlanCommand::Adjust { id, request } => {
            let tutor = app.tutor().await?;
            let missions = tutor.adjust_plan(&store, id, &request).await?;
            println!("Plan #{id} adjusted, {} missions:", missions.len());
            for mission in &missions {
                print_mission_line(mission);
            }
            Ok(())
        }
    }
}

async fn run_mission(app: &App, command: MissionCommand) -> Result<()> {
    let store = app.plans().await?;
    match command {
        MissionCommand::List { plan } => {
            for mission in store.list_missions(plan).await? {
                print_mission_line(&mission);
            }
            Ok(())
        }
        MissionCommand::Advance { plan } => {
            match store.advance(plan).await? {
                Some(next) => {
                    println!("Now current:");
                    print_mission_line(&next);
                }
                None => println!("Plan #{plan} is complete."),
            }
            Ok(())
        }
        MissionCommand::SetStatus { id, status } => {
            let mission = store
                .set_mission_status(id, MissionStatus::parse(&status))
                .await?;
            print_mission_line(&mission);
            Ok(())
        }
    }
}

async fn run_learn(app: &App, plan_id: i32, mission_id: Option<i32>) -> Result<()> {
    let store = app.plans().await?;
    let missions = store.list_missions(plan_id).await?;

    let target = match mission_id {
        Some(id) => missions.iter().find(|m| m.id == id),
        None => missions.iter().find(|m| m.status == MissionStatus::Current),
    };
    let Some(target) = target else {
        return Err(LearningOsError::Config(format!(
            "no matching mission in plan #{plan_id}"
        )));
    };

    // Earlier days give the model continuity context.
    let previous: Vec<String> = missions
        .iter()
        .filter(|m| m.day_number < target.day_number)
        .map(|m| m.title.clone())
        .collect();

    let tutor = app.tutor().await?;
    let content = tutor.lesson_content(&target.title, &previous).await?;
    println!("# Day {}: {}\n", target.day_number, target.title);
    println!("{content}");
    Ok(())
}

async fn run_practice(app: &App, topic: &str, kind: &str) -> Result<()> {
    let tutor = app.tutor().await?;
    let kind = PracticeKind::from_option(Some(kind));
    let content = tutor.practice(topic, kind).await?;
    println!("{content}");
    Ok(())
}

async fn run_ask(app: &App, question: &str, save: bool) -> Result<()> {
    let tutor = app.tutor().await?;
    let answer = tutor.answer(question).await?;
    println!("{answer}");

    if save {
        let store = app.explanations().await?;
        let saved = store
            .save(&app.user_id, question, &answer, "", "intermediate")
            .await?;
        println!("\nSaved as explanation #{}", saved.id);
    }
    Ok(())
}

/// Line-oriented chat loop. The session context carries the selected plan
/// and a bounded history; both are folded into each prompt.
async fn run_chat(app: &App, plan_id: Option<i32>) -> Result<()> {
    let tutor = app.tutor().await?;
    let mut session = SessionContext::new(&app.user_id);
    let mut plan_context = None;
    if let Some(id) = plan_id {
        session.select_plan(id);
        let store = app.plans().await?;
        let plan = store.get_plan(id).await?;
        let missions = store.list_missions(id).await?;
        plan_context = Some(plan_context_block(&plan, &missions));
    }

    println!("Chat with your tutor. Empty line or Ctrl-D to quit.");
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        std::io::stdout()
            .flush()
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        line.clear();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| LearningOsError::Runtime(e.to_string()))?;
        let question = line.trim();
        if read == 0 || question.is_empty() {
            break;
        }

        let prompt = chat_question(&session, plan_context.as_deref(), question);
        session.push_turn(ChatRole::User, question);
        match tutor.answer(&prompt).await {
            Ok(answer) => {
                println!("{answer}\n");
                session.push_turn(ChatRole::Assistant, answer);
            }
            Err(err) => println!("error: {err}\n"),
        }
    }
    Ok(())
}

fn chat_question(
    session: &SessionContext,
    plan_context: Option<&str>,
    question: &str,
) -> String {
    let mut prompt = String::new();
    if let Some(context) = plan_context {
        prompt.push_str(context);
        prompt.push('\n');
    }

    let mut history = String::new();
    for turn in session.history() {
        let who = match turn.role {
            ChatRole::User => "Student",
            ChatRole::Assistant => "Tutor",
        };
        history.push_str(&format!("{who}: {}\n", turn.content));
    }
    if !history.is_empty() {
        prompt.push_str(&format!("Conversation so far:\n{history}\n"));
    }

    if prompt.is_empty() {
        question.to_string()
    } else {
        format!("{prompt}New question: {question}")
    }
}

fn plan_context_block(plan: &PlanItem, missions: &[MissionItem]) -> String {
    let mut block = format!(
        "The student is following a study plan: {} ({} days, {}).\n",
        plan.learning_target, plan.total_days, plan.difficulty
    );
    if let Some(current) = missions.iter().find(|m| m.status == MissionStatus::Current) {
        block.push_str(&format!(
            "They are currently on day {}: {}.\n",
            current.day_number, current.title
        ));
    }
    block
}

async fn run_knowledge(app: &App, command: KnowledgeCommand) -> Result<()> {
    let store = app.knowledge().await?;
    match command {
        KnowledgeCommand::Add {
            term,
            definition,
            item_type,
            plan,
        } => {
            let item = store
                .add_item(
                    &app.user_id,
                    plan,
                    ItemType::from_option(Some(&item_type)),
                    &term,
                    &definition,
                )
                .await?;
            println!("Saved #{} [{}] {}", item.id, item.item_type.as_str(), item.term);
            Ok(())
        }
        KnowledgeCommand::List { plan } => {
            let items = match plan {
                Some(plan_id) => store.list_for_plan(&app.user_id, plan_id).await?,
                None => store.list_for_user(&app.user_id).await?,
            };
            for item in items {
                println!(
                    "#{:<4} [{:<10}] {}: {}",
                    item.id,
                    item.item_type.as_str(),
                    item.term,
                    item.definition
                );
            }
            Ok(())
        }
        KnowledgeCommand::Delete { id } => {
            if store.delete_item(id).await? {
                println!("Deleted item #{id}");
            } else {
                println!("No item #{id}");
            }
            Ok(())
        }
    }
}

async fn run_saved(app: &App, command: SavedCommand) -> Result<()> {
    let store = app.explanations().await?;
    match command {
        SavedCommand::List { limit } => {
            for item in store.list(&app.user_id, limit).await? {
                println!(
                    "#{:<4} {}  {}",
                    item.id,
                    format_ts(item.created_at),
                    item.query
                );
            }
            Ok(())
        }
        SavedCommand::Delete { id } => {
            if store.delete(id).await? {
                println!("Deleted explanation #{id}");
            } else {
                println!("No explanation #{id}");
            }
            Ok(())
        }
    }
}

async fn run_usage(app: &App, limit: usize) -> Result<()> {
    let store = UsageStore::new(&app.sqlite_path).await?;
    for item in store.recent(limit).await? {
        println!(
            "{}  {:<24} {:>6} tokens  {}",
            format_ts(item.created_at),
            item.endpoint_type,
            item.tokens_used,
            if item.success { "ok" } else { "failed" }
        );
    }
    Ok(())
}

async fn run_validate_key(app: &App) -> Result<()> {
    let service = app.assistant().await?;
    match service.validate_key().await {
        Ok(()) => {
            println!("API key is valid.");
            Ok(())
        }
        Err(err) => {
            println!("API key check failed: {err}");
            Err(err)
        }
    }
}

fn print_mission_line(mission: &MissionItem) {
    let marker = match mission.status {
        MissionStatus::Completed => "x",
        MissionStatus::Current => ">",
        MissionStatus::Pending => " ",
    };
    println!(
        "  [{marker}] Day {:<3} {} (~{} min)",
        mission.day_number, mission.title, mission.estimated_minutes
    );
}

fn format_ts(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> PlanItem {
        PlanItem {
            id: 1,
            user_id: "u1".to_string(),
            learning_target: "Basics of SQL".to_string(),
            total_days: 3,
            difficulty: "beginner".to_string(),
            hours_per_day: 2,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn mission(day: i32, title: &str, status: MissionStatus) -> MissionItem {
        MissionItem {
            id: day,
            plan_id: 1,
            day_number: day,
            title: title.to_string(),
            description: String::new(),
            detailed_content: String::new(),
            status,
            estimated_minutes: 120,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn plan_context_names_the_current_day() {
        let missions = vec![
            mission(1, "SELECT", MissionStatus::Completed),
            mission(2, "Joins", MissionStatus::Current),
            mission(3, "Aggregation", MissionStatus::Pending),
        ];
        let block = plan_context_block(&plan(), &missions);
        assert!(block.contains("Basics of SQL"));
        assert!(block.contains("day 2: Joins"));
    }

    #[test]
    fn chat_question_folds_plan_and_history_into_the_prompt() {
        let mut session = SessionContext::new("u1");
        let bare = chat_question(&session, None, "what is a join?");
        assert_eq!(bare, "what is a join?");

        session.push_turn(ChatRole::User, "what is a join?");
        session.push_turn(ChatRole::Assistant, "It combines rows.");
        let block = plan_context_block(&plan(), &[mission(2, "Joins", MissionStatus::Current)]);
        let prompt = chat_question(&session, Some(&block), "and outer joins?");

        assert!(prompt.contains("study plan: Basics of SQL"));
        assert!(prompt.contains("Student: what is a join?"));
        assert!(prompt.contains("Tutor: It combines rows."));
        assert!(prompt.ends_with("New question: and outer joins?"));
    }
}
