//! Dashboard domain preferences

use anyhow::Result;
use serde::Serialize;

use crate::cli::DomainsCommand;
use crate::config::RuntimeContext;
use crate::local_state::LocalState;
use crate::output::print_output;
use crate::rooms::DEFAULT_DOMAINS;

#[derive(Debug, Serialize)]
struct DomainSettings<'a> {
    /// Empty when every domain is shown
    enabled_domains: &'a [String],
    show_hidden: bool,
}

pub fn run(ctx: &RuntimeContext, command: DomainsCommand) -> Result<()> {
    let state = match command {
        DomainsCommand::Show => ctx.state_file().load()?,
        DomainsCommand::Set {
            domains,
            all,
            defaults,
            show_hidden,
        } => ctx.state_file().update(|state| {
            state.enabled_domains = if all {
                Vec::new()
            } else if defaults {
                DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect()
            } else {
                normalize(domains)
            };
            if let Some(show_hidden) = show_hidden {
                state.show_hidden = show_hidden;
            }
        })?,
    };

    print_settings(ctx, &state)
}

fn normalize(domains: Vec<String>) -> Vec<String> {
    let mut domains: Vec<String> = domains
        .iter()
        .flat_map(|d| d.split(','))
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect();
    domains.sort();
    domains.dedup();
    domains
}

fn print_settings(ctx: &RuntimeContext, state: &LocalState) -> Result<()> {
    if !ctx.is_table_output() {
        return print_output(
            ctx,
            &DomainSettings {
                enabled_domains: &state.enabled_domains,
                show_hidden: state.show_hidden,
            },
        );
    }

    if state.enabled_domains.is_empty() {
        println!("Domains: all");
    } else {
        println!("Domains: {}", state.enabled_domains.join(", "));
    }
    println!("Show hidden: {}", if state.show_hidden { "yes" } else { "no" });
    Ok(())
}
