//! `gantry projects` — inspect the projects file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use gantry_core::projects::load_projects;

#[derive(Subcommand, Debug)]
pub enum ProjectsCommand {
    /// List configured projects in file order.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Projects file to read.
    #[arg(long)]
    pub projects: PathBuf,
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "project")]
    id: String,
    #[tabled(rename = "source")]
    source: String,
}

pub fn run(command: ProjectsCommand) -> Result<()> {
    match command {
        ProjectsCommand::List(args) => {
            let projects = load_projects(&args.projects).with_context(|| {
                format!("failed to read projects file {}", args.projects.display())
            })?;

            if projects.is_empty() {
                println!("No projects configured in {}.", args.projects.display());
                return Ok(());
            }

            let rows: Vec<ProjectRow> = projects
                .into_iter()
                .map(|p| ProjectRow {
                    id: p.id.to_string(),
                    source: p.source,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
            Ok(())
        }
    }
}
