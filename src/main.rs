use anyhow::Context;
use clap::Parser;
use dbgp::{Client, Config, ConnectMode, Connection, PropertyId, PropertyTree, Response};
use itertools::Itertools;
use log::warn;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::time::Duration;

const PROMPT: &str = "(dbgp) ";

const HELP_TEXT: &str = "\
status                    engine status
run | r                   start or resume the script
step_into | s             step into the next statement
step_over | n             step over the next statement
step_out | o              step out of the current function
stop                      terminate the script
detach                    detach and let the script run
stack | bt                show stack frames
names                     show context names
context [id] [depth]      show variables of a context
get <name>                show a single variable
eval <expression>         evaluate an expression
break <args>              set a breakpoint, e.g. break -t line -f file:///a.php -n 3
breaks                    list breakpoints
enable | disable <id>     enable or disable a breakpoint
remove <id>               remove a breakpoint
feature <name> [value]    get or set an engine feature
quit | q                  close the connection and exit";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface to listen on, or host to connect to with --connect
    #[clap(long)]
    host: Option<String>,

    /// Port of the debugger connection (default: 9000)
    #[clap(short, long)]
    port: Option<u16>,

    /// Seconds to wait for the debugger engine (default: 30)
    #[clap(long)]
    timeout: Option<u64>,

    /// Connect to a listening engine instead of waiting for it
    #[clap(long)]
    connect: bool,

    /// Path to a config file (default: ~/.config/dbgp/config.toml)
    #[clap(long, env = "DBGP_CONFIG")]
    config: Option<PathBuf>,
}

enum Flow {
    Continue,
    Exit,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?.connection;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(timeout) = args.timeout {
        config.timeout = Duration::from_secs(timeout);
    }
    if args.connect {
        config.mode = ConnectMode::Connect;
    }

    match config.mode {
        ConnectMode::Listen => println!(
            "Waiting for a debugger engine on {} ({}s)...",
            config.address(),
            config.timeout.as_secs()
        ),
        ConnectMode::Connect => println!("Connecting to {}...", config.address()),
    }
    let mut client =
        Client::new(Connection::new(config)).context("start debugging session")?;

    let init = client.init();
    println!(
        "Connected: language {}, idekey {}, file {}",
        init.language,
        init.idekey.as_deref().unwrap_or("-"),
        init.fileuri.as_deref().unwrap_or("-"),
    );

    let mut editor = DefaultEditor::new()?;
    loop {
        let input = match editor.readline(PROMPT) {
            Ok(input) => input,
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => {
                println!("error: {err:#}");
                break;
            }
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        _ = editor.add_history_entry(input);

        match execute(&mut client, input) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(err) => {
                println!("error: {err:#}");
                if err.is_connection_lost() {
                    warn!(target: "dbgp", "connection lost: {err:#}");
                    break;
                }
            }
        }
        if !client.is_connected() {
            println!("Connection closed");
            break;
        }
    }

    client.close();
    Ok(())
}

fn execute(client: &mut Client<Connection>, input: &str) -> dbgp::Result<Flow> {
    let (cmd, rest) = input.split_once(' ').unwrap_or((input, ""));
    let rest = rest.trim();

    match cmd {
        "q" | "quit" => return Ok(Flow::Exit),
        "h" | "help" => println!("{HELP_TEXT}"),
        "status" => print_status(&client.status()?),
        "r" | "run" => print_status(&client.run()?),
        "s" | "step_into" => print_status(&client.step_into()?),
        "n" | "step_over" => print_status(&client.step_over()?),
        "o" | "step_out" => print_status(&client.step_out()?),
        "stop" => print_status(&client.stop()?),
        "detach" => {
            print_status(&client.detach()?);
            return Ok(Flow::Exit);
        }
        "bt" | "stack" => {
            for frame in client.stack_get()?.stack()? {
                println!(
                    "#{} {} at {}:{}",
                    frame.level,
                    frame.location.as_deref().unwrap_or("?"),
                    frame.filename,
                    frame.lineno
                );
            }
        }
        "names" => {
            for (id, name) in client.context_names()?.context_names()? {
                println!("{id}: {name}");
            }
        }
        "context" => {
            let mut args = rest.split_whitespace();
            let context = args.next().map(|a| a.parse::<i64>()).transpose();
            let depth = args.next().map(|a| a.parse::<u32>()).transpose();
            let (Ok(context), Ok(depth)) = (context, depth) else {
                println!("usage: context [id] [depth]");
                return Ok(Flow::Continue);
            };
            print_properties(&client.context_get(context.unwrap_or(0), depth.unwrap_or(0))?)?;
        }
        "get" if !rest.is_empty() => print_properties(&client.property_get(rest)?)?,
        "eval" if !rest.is_empty() => print_properties(&client.eval(rest)?)?,
        "break" if !rest.is_empty() => {
            println!("breakpoint {} set", client.breakpoint_set(rest)?.breakpoint_id()?)
        }
        "breaks" => println!("{}", client.breakpoint_list()?.as_str()),
        "enable" | "disable" | "remove" => {
            let Ok(id) = rest.parse::<u64>() else {
                println!("usage: {cmd} <id>");
                return Ok(Flow::Continue);
            };
            match cmd {
                "enable" => client.breakpoint_enable(id)?,
                "disable" => client.breakpoint_disable(id)?,
                _ => client.breakpoint_remove(id)?,
            };
        }
        "feature" if !rest.is_empty() => match rest.split_once(' ') {
            None => println!("{}", client.feature_get(rest)?),
            Some((name, value)) => {
                client.feature_set(name, value.trim())?;
            }
        },
        _ => println!("unknown command or missing argument, type `help` for a list of commands"),
    }
    Ok(Flow::Continue)
}

fn print_status(response: &Response) {
    match response.reason() {
        Ok(Some(reason)) => println!("{response} ({reason})"),
        _ => println!("{response}"),
    }
}

/// Tree connectors for a property, built from the `is_last_child` flags of its ancestors.
fn tree_prefix(tree: &PropertyTree, id: PropertyId) -> String {
    let prop = tree.get(id);
    if prop.parent.is_none() {
        return String::new();
    }

    let mut parts = vec![if prop.is_last_child { "└─ " } else { "├─ " }];
    let mut current = prop.parent;
    while let Some(parent_id) = current {
        let parent = tree.get(parent_id);
        if parent.parent.is_some() {
            parts.push(if parent.is_last_child { "   " } else { "│  " });
        }
        current = parent.parent;
    }
    parts.iter().rev().join("")
}

fn print_properties(response: &Response) -> dbgp::Result<()> {
    for tree in response.properties()? {
        for (id, prop) in tree.iter() {
            let prefix = tree_prefix(&tree, id);
            if prop.has_children() {
                println!("{prefix}{} ({})", prop.display_name, prop.type_and_size());
            } else {
                println!(
                    "{prefix}{} ({}) = {}",
                    prop.display_name,
                    prop.type_and_size(),
                    prop.value
                );
            }
        }
    }
    Ok(())
}
