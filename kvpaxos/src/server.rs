#[macro_use] extern crate log;

use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "kvpaxos-server")]
struct Opt {
    /// Unique server ID
    #[structopt(short = "i", long = "id")]
    id: usize,

    /// Port to listen on for client requests
    #[structopt(short = "p", long = "port")]
    port: usize,

    /// Total number of servers
    #[structopt(short = "c", long = "count")]
    count: usize,

    /// Timeout between servers (in milliseconds)
    #[structopt(short = "t", long = "timeout", default_value = "1000")]
    timeout: u64,

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

    let config = paxos::Config::new(
            opt.id,
            opt.port,
            opt.count
        ).with_timeout(
            std::time::Duration::from_millis(opt.timeout)
        );

    if let Err(error) = config.run::<kvpaxos::Store>().await {
        error!("replica {} stopped: {}", opt.id, error);
        std::process::exit(1);
    }
}
