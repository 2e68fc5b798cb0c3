use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use habitual::{
    api::{CreateInput, HabitApi, IdInput, Session, ToggleInput, UpdateInput},
    config::Config,
    db::{Database, Habit},
    error::{Error, Result},
    serve,
    streak::goal_reached,
};
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "habitual")]
#[command(author, version, about = "Personal habit tracker: check habits off daily and keep your streaks going")]
struct Cli {
    /// Session token (from `habitual user add` or `habitual user login`)
    #[arg(long, global = true, env = "HABITUAL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create .habitual/ with a database and default config
    Init,

    /// Manage users and session tokens
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Revoke the current session token
    Logout,

    /// List your habits
    List {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create a habit
    Add {
        /// Habit name
        name: String,
    },

    /// Mark a habit done for today
    Done {
        /// Habit id (or a unique prefix)
        id: String,
    },

    /// Take back a completion
    Undo {
        /// Habit id (or a unique prefix)
        id: String,
    },

    /// Rename a habit or change its goal
    Edit {
        /// Habit id (or a unique prefix)
        id: String,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// Target streak length (0 for none)
        #[arg(short, long)]
        goal: Option<u32>,
    },

    /// Set a habit's streak back to zero
    Reset {
        /// Habit id (or a unique prefix)
        id: String,
    },

    /// Delete a habit
    #[command(alias = "delete")]
    Rm {
        /// Habit id (or a unique prefix)
        id: String,
    },

    /// Start the JSON API server
    Serve {
        /// Port to listen on (defaults to [server].port in config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind (defaults to [server].host in config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum UserAction {
    /// Register a user and print a session token
    Add { name: String },
    /// Issue a fresh session token for an existing user
    Login { name: String },
    /// List registered users
    List,
}

fn init_logging(config: &Config, command: &Command) {
    // One-shot commands stay quiet unless asked; the server logs per config
    let fallback = match command {
        Command::Serve { .. } => config.log.filter.as_str(),
        _ => "warn",
    };
    let filter = EnvFilter::try_from_env("HABITUAL_LOG")
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_logging(&config, &cli.command);
    if let Some(e) = config_error {
        warn!("{}; using defaults", e);
    }

    if let Err(e) = run(cli, &config) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: &Config) -> Result<()> {
    match cli.command {
        Command::Init => {
            let cwd = std::env::current_dir()?;
            habitual::init::init_project(&cwd).map_err(Error::Init)
        }

        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "habitual", &mut std::io::stdout());
            Ok(())
        }

        Command::User { action } => run_user(action),

        Command::Serve { port, host } => {
            let api = HabitApi::new(Database::open()?);
            let addr = format!(
                "{}:{}",
                host.unwrap_or_else(|| config.server.host.clone()),
                port.unwrap_or(config.server.port)
            );
            eprintln!("\n{}", "habitual".green().bold());
            eprintln!("   API: http://{}/api/habits", addr);
            eprintln!("   Press Ctrl+C to stop\n");
            serve::start_api_server(&addr, api)?;
            Ok(())
        }

        Command::Logout => {
            let db = Database::open()?;
            let token = cli.token.ok_or(Error::Unauthorized)?;
            if db.delete_session(&token)? {
                println!("{}", "Signed out".green());
                Ok(())
            } else {
                Err(Error::Unauthorized)
            }
        }

        command => {
            let api = HabitApi::new(Database::open()?);
            let session = api.authenticate(cli.token.as_deref())?;
            run_habit_command(&api, &session, command)
        }
    }
}

fn run_user(action: UserAction) -> Result<()> {
    let db = Database::open()?;
    match action {
        UserAction::Add { name } => {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::Validation("User name must not be empty".to_string()));
            }
            let user = db.create_user(name)?;
            let token = db.create_session(&user.id)?;
            println!("{} user {} ({})", "Created".green(), user.name.bold(), user.id);
            print_token(&token);
        }
        UserAction::Login { name } => {
            let user = db
                .find_user_by_name(name.trim())?
                .ok_or_else(|| Error::Validation(format!("No user named '{}'", name.trim())))?;
            let token = db.create_session(&user.id)?;
            print_token(&token);
        }
        UserAction::List => {
            for user in db.get_all_users()? {
                println!("{}  {}", user.id.dimmed(), user.name);
            }
        }
    }
    Ok(())
}

fn print_token(token: &str) {
    println!("Session token: {}", token);
    println!("\n  export HABITUAL_TOKEN={}", token);
}

fn run_habit_command(api: &HabitApi, session: &Session, command: Command) -> Result<()> {
    let resolve = |id: &str| api.db().find_habit(&session.user_id, id);

    match command {
        Command::List { json } => {
            let habits = api.get_user_habits(session)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&habits)?);
            } else if habits.is_empty() {
                println!("No habits yet. Add one with {}", "habitual add <name>".cyan());
            } else {
                for habit in &habits {
                    println!("{}", format_habit(habit));
                }
            }
        }

        Command::Add { name } => {
            let habit = api.create(session, &CreateInput { name })?;
            println!("{} habit {} {}", "Created".green(), short_id(&habit.id).dimmed(), habit.name.bold());
        }

        Command::Done { id } => {
            let habit = resolve(&id)?;
            let habit = api.toggle(session, &ToggleInput { id: habit.id, done: true })?;
            println!("{} {}", "Done:".green(), format_habit(&habit));
            if goal_reached(habit.streak, habit.goal) {
                println!("{}", format!("Goal of {} days reached!", habit.goal).yellow().bold());
            }
        }

        Command::Undo { id } => {
            let habit = resolve(&id)?;
            let habit = api.toggle(session, &ToggleInput { id: habit.id, done: false })?;
            println!("{} {}", "Undone:".yellow(), format_habit(&habit));
        }

        Command::Edit { id, name, goal } => {
            if name.is_none() && goal.is_none() {
                return Err(Error::Validation("Nothing to change: pass --name and/or --goal".to_string()));
            }
            let habit = resolve(&id)?;
            let input = UpdateInput {
                name: name.unwrap_or_else(|| habit.name.clone()),
                goal: goal.unwrap_or(habit.goal),
                last_performed: habit.last_performed,
                done: habit.done,
                streak: habit.streak,
                id: habit.id,
            };
            let habit = api.update(session, &input)?;
            println!("{} {}", "Updated:".green(), format_habit(&habit));
        }

        Command::Reset { id } => {
            let habit = resolve(&id)?;
            let habit = api.reset_streak(session, &IdInput { id: habit.id })?;
            println!("{} {}", "Reset:".yellow(), format_habit(&habit));
        }

        Command::Rm { id } => {
            let habit = resolve(&id)?;
            api.delete(session, &IdInput { id: habit.id.clone() })?;
            println!("{} habit {} {}", "Deleted".red(), short_id(&habit.id).dimmed(), habit.name);
        }

        // Handled in run()
        Command::Init
        | Command::User { .. }
        | Command::Logout
        | Command::Serve { .. }
        | Command::Completion { .. } => {}
    }
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_habit(habit: &Habit) -> String {
    let mark = if habit.streak_state().is_done_today(&Local::now()) {
        "[x]".green()
    } else {
        "[ ]".normal()
    };

    let goal = if habit.goal == 0 {
        String::new()
    } else if goal_reached(habit.streak, habit.goal) {
        format!("  goal {}/{}", habit.streak, habit.goal).yellow().to_string()
    } else {
        format!("  goal {}/{}", habit.streak, habit.goal)
    };

    format!(
        "{}  {} {:<24} streak {}{}",
        short_id(&habit.id).dimmed(),
        mark,
        habit.name,
        habit.streak,
        goal
    )
}
