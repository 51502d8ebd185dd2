use std::time::Duration;

use structopt::StructOpt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use kvpaxos::Clerk;

enum Input {
    /// Read the value at a key
    Get {
        key: String,
    },

    /// Overwrite the value at a key
    Put {
        key: String,
        value: String,
    },

    /// Extend the value at a key
    Append {
        key: String,
        value: String,
    },

    Help,
}

fn usage() {
    println!(
        "{}{}{}{}{}{}",
        "--------------------------------------------------------------\n",
        "Possible commands:\n",
        "get <KEY>            | g <KEY>        -- Read <KEY>\n",
        "put <KEY> <VAL>      | p <KEY> <VAL>  -- Set <KEY> to <VAL>\n",
        "append <KEY> <VAL>   | a <KEY> <VAL>  -- Add <VAL> to <KEY>\n",
        "--------------------------------------------------------------",
    );
}

impl std::str::FromStr for Input {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut iter = s.trim().splitn(3, ' ');
        let command = iter.next();
        let key = iter.next().map(str::to_string);
        let value = iter.next().map(str::to_string);
        match (command, key, value) {
        | (Some("help"), None, None) | (Some("h"), None, None) => Ok(Input::Help),
        | (Some("get"), Some(key), None) | (Some("g"), Some(key), None) => Ok(Input::Get { key }),
        | (Some("put"), Some(key), Some(value)) | (Some("p"), Some(key), Some(value)) => {
            Ok(Input::Put { key, value })
        }
        | (Some("append"), Some(key), Some(value)) | (Some("a"), Some(key), Some(value)) => {
            Ok(Input::Append { key, value })
        }
        | _ => Err(()),
        }
    }
}

async fn run(mut clerk: Clerk) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Main interaction loop
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = match lines.next_line().await? {
        | Some(line) => line,
        | None => return Ok(()),
        };

        // Attempt to parse command from user input
        let input = match line.parse::<Input>() {
        | Ok(input) => input,
        | Err(()) => {
            println!("[ERROR]: could not parse command");
            continue
        }
        };

        match input {
        | Input::Get { key } => {
            let value = clerk.get(&key).await;
            println!("[RESPONSE]: {:?}", value);
        }
        | Input::Put { key, value } => {
            clerk.put(&key, &value).await;
            println!("[RESPONSE]: ok");
        }
        | Input::Append { key, value } => {
            clerk.append(&key, &value).await;
            println!("[RESPONSE]: ok");
        }
        | Input::Help => usage(),
        }
    }
}

#[derive(StructOpt)]
#[structopt(name = "kvpaxos-client")]
struct Opt {
    /// Client ports of every server
    #[structopt(short = "p", long = "ports", required = true)]
    ports: Vec<usize>,

    /// Timeout for a single request (in milliseconds)
    #[structopt(short = "t", long = "timeout", default_value = "1000")]
    timeout: u64,

    /// Try servers in random order instead of round-robin
    #[structopt(short = "r", long = "random")]
    random: bool,

    /// Log more; repeat for even more
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u64,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    if let Err(error) = kvpaxos::logger::setup(opt.verbose) {
        eprintln!("[ERROR]: could not set up logging: {}", error);
    }

    let clerk = match Clerk::connect(&opt.ports, Duration::from_millis(opt.timeout)) {
    | Ok(clerk) if opt.random => clerk.with_rotation(paxos::Rotation::Random),
    | Ok(clerk) => clerk,
    | Err(error) => {
        eprintln!("[ERROR]: {}", error);
        std::process::exit(1);
    }
    };

    if let Err(error) = run(clerk).await {
        eprintln!("[ERROR]: {}", error);
        std::process::exit(1);
    }
}
