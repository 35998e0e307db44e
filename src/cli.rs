mod cli_parser;
pub use cli_parser::Cli;

mod commands;
pub use commands::Commands;

mod execute_command;
pub use execute_command::execute_command;

mod help_template;
pub use help_template::HELP_TEMPLATE;
