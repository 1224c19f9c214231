//! `toolstream prompt` — print the system prompt a run would install.

use toolstream_agent::prompts;
use toolstream_config::AppConfig;

pub fn render(config: &AppConfig) -> String {
    prompts::system_prompt(
        &config.agent.system_prompt,
        &config.tools,
        &config.agent.bundle_wrapper,
    )
}

pub fn run(config: &AppConfig) {
    println!("{}", render(config));
}
