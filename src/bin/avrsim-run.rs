use avrsim::cli::command;
use structopt::StructOpt;

fn main() {
    command::terminal_init();
    command::run(command::SubcommandRun::from_args());
}
