use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use paperdesk::config::Config;
use paperdesk::layers::api::{BackendClient, FORMATS, SOURCES};
use paperdesk::layers::auth::AuthSession;
use paperdesk::layers::browse::{filter_text, filter_view, find_by_title, Paginator, View};
use paperdesk::layers::collections::{AddOutcome, CollectionItem, CollectionStore, CrossGroup, ItemKey};
use paperdesk::layers::export::{ExportFormat, ReferenceExporter};
use paperdesk::layers::normalize::{normalize_paper, FALLBACK_IMAGES};
use paperdesk::layers::session::{AdvancedFilters, SearchSession};
use paperdesk::layers::storage::LocalStorage;
use paperdesk::layers::subjects::SubjectTree;
use paperdesk::layers::{Paper, RawPaper};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "paperdesk", about = "Literature search and a local paper collection")]
struct Cli {
    /// Backend base URL (overrides PAPERDESK_API_BASE_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Local storage directory (overrides PAPERDESK_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the backend is reachable
    Health,
    /// Search literature, normalize and deduplicate the hits
    Search(SearchArgs),
    /// Search several keywords at once
    BatchSearch {
        keywords: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long, default_value = "crossref")]
        source: String,
    },
    /// Fetch one paper by identifier
    Lookup {
        #[arg(value_enum)]
        kind: LookupKind,
        id: String,
    },
    #[command(subcommand)]
    Collection(CollectionCommand),
    #[command(subcommand)]
    Subject(SubjectCommand),
    /// Format a saved paper as a reference
    Format {
        item_id: i64,
        #[arg(long, default_value = "apa")]
        style: String,
    },
    /// Export saved papers as BibTeX or RIS
    Export {
        #[arg(value_enum)]
        format: ExportKind,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Plagiarism and AI-content check of a text file
    Check {
        file: PathBuf,
        #[arg(long)]
        no_ai: bool,
    },
    /// Recent searches and trending keywords
    Trending {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long, default_value_t = 10)]
        top_k: u32,
    },
    History {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    Recommend {
        /// Interest to recommend for; personalized when omitted
        interest: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    #[command(subcommand)]
    Graph(GraphCommand),
    Register {
        email: String,
        username: String,
        password: String,
    },
    Login {
        username: String,
        password: String,
    },
    Logout,
    Whoami,
}

#[derive(Args)]
struct SearchArgs {
    query: String,
    #[arg(long, default_value = "all")]
    source: String,
    #[arg(long, default_value = "relevance")]
    sort: String,
    #[arg(long, default_value = "")]
    author: String,
    #[arg(long, default_value = "")]
    year_from: String,
    #[arg(long, default_value = "")]
    year_to: String,
    #[arg(long, default_value = "")]
    journal: String,
    /// Comma-separated keywords
    #[arg(long, default_value = "")]
    keywords: String,
    #[arg(long, default_value = "")]
    citation_min: String,
    #[arg(long, default_value = "")]
    citation_max: String,
    #[arg(long)]
    open_access: bool,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 10)]
    per_page: usize,
}

#[derive(Args)]
struct ViewArgs {
    #[arg(long)]
    subject: Option<i64>,
    #[arg(long)]
    group: Option<i64>,
}

impl ViewArgs {
    fn view(&self) -> View {
        match (self.group, self.subject) {
            (Some(group), _) => View::Group(group),
            (None, Some(subject)) => View::Subject(subject),
            (None, None) => View::All,
        }
    }
}

#[derive(Subcommand)]
enum CollectionCommand {
    /// Save a paper (looked up by DOI) into a group
    Add {
        doi: String,
        #[arg(long)]
        subject: Option<i64>,
        #[arg(long)]
        group: Option<i64>,
        /// Also add when the paper already sits in another group
        #[arg(long)]
        yes: bool,
    },
    /// Remove by local item ID or paper ID
    Remove { key: String },
    Check { paper_id: String },
    BatchDelete { ids: Vec<i64> },
    List {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value = "")]
        filter: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        per_page: usize,
    },
    /// Closest saved titles
    Find {
        title: String,
        #[arg(long, default_value_t = 5)]
        threshold: usize,
    },
}

#[derive(Subcommand)]
enum SubjectCommand {
    List,
    Add { name: String },
    Rename { subject_id: i64, name: String },
    Delete { subject_id: i64 },
    Toggle { subject_id: i64 },
    AddGroup { subject_id: i64, name: String },
    RenameGroup { subject_id: i64, group_id: i64, name: String },
    DeleteGroup { subject_id: i64, group_id: i64 },
}

#[derive(Subcommand)]
enum GraphCommand {
    Citations {
        doi: String,
        #[arg(long, default_value_t = 60)]
        max_nodes: u32,
    },
    Authors {
        author_id: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    Topic {
        keyword: String,
        #[arg(long, default_value_t = 10)]
        years: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LookupKind {
    Doi,
    Arxiv,
    Openalex,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    Bibtex,
    Ris,
}

fn print_paper(n: usize, paper: &Paper) {
    println!("{:>3}. {}", n, paper.title);
    if !paper.authors.is_empty() {
        println!("     {}", paper.authors.join(", "));
    }
    println!("     {} | {}", paper.category, paper.metadata);
    println!("     id: {}", paper.id);
}

fn print_item(item: &CollectionItem) {
    println!(
        "[{}] {} (paper {}, subject {}, group {})",
        item.id, item.title, item.paper_id, item.subject_id, item.group_id
    );
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn paper_from_lookup(raw: &RawPaper) -> Paper {
    normalize_paper(raw, 0, &FALLBACK_IMAGES)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?.override_with(cli.api_url.as_deref(), cli.data_dir.as_deref())?;

    let storage = LocalStorage::open(&config.data_dir)?;
    let auth = AuthSession::new(storage.clone());
    let client = BackendClient::new(config.api_base_url.clone())?.with_token(auth.token()?);

    match cli.command {
        Command::Health => {
            if client.health().await {
                println!("Backend at {} is healthy.", client.base_url());
            } else {
                println!("Backend at {} is not accessible.", client.base_url());
            }
        }
        Command::Search(args) => {
            if args.source != "all" && !SOURCES.contains(&args.source.as_str()) {
                return Err(anyhow!("Unknown source {}; expected all or one of {:?}", args.source, SOURCES));
            }
            let mut session = SearchSession::new();
            session.source = args.source.clone();
            session.sort_by = args.sort.clone();
            session.filters = AdvancedFilters {
                author: args.author,
                year_from: args.year_from,
                year_to: args.year_to,
                journal: args.journal,
                keywords: args.keywords,
                citation_min: args.citation_min,
                citation_max: args.citation_max,
                open_access: args.open_access,
            };

            session.run(&client, &args.query).await;
            if let Some(error) = session.error() {
                println!("{}", error);
                return Ok(());
            }

            let mut pager = Paginator::new(args.per_page);
            pager.set_page(args.page);
            let papers = session.papers();
            let (first, _) = pager.bounds(papers.len());
            println!(
                "{} unique results, page {}/{}",
                papers.len(),
                pager.current_page(),
                pager.total_pages(papers.len())
            );
            for (i, paper) in pager.page(papers).iter().enumerate() {
                print_paper(first + i + 1, paper);
            }
        }
        Command::BatchSearch { keywords, limit, source } => {
            for outcome in client.batch_search(&keywords, limit, &source).await {
                match &outcome.result {
                    Ok(resp) => println!("{}: {} results", outcome.keyword, resp.results.len()),
                    Err(e) => println!("{}: failed ({})", outcome.keyword, e.user_message()),
                }
            }
        }
        Command::Lookup { kind, id } => {
            let raw = match kind {
                LookupKind::Doi => client.literature_by_doi(&id).await,
                LookupKind::Arxiv => client.paper_by_arxiv(&id).await,
                LookupKind::Openalex => client.work_by_openalex(&id).await,
            }
            .map_err(|e| anyhow!(e.user_message()))?;
            print_paper(1, &paper_from_lookup(&raw));
        }
        Command::Collection(cmd) => run_collection(cmd, &client, storage).await?,
        Command::Subject(cmd) => run_subject(cmd, storage)?,
        Command::Format { item_id, style } => {
            if !FORMATS.contains(&style.as_str()) {
                return Err(anyhow!("Unknown style {}; expected one of {:?}", style, FORMATS));
            }
            let store = CollectionStore::open(storage)?;
            let item = store
                .items()
                .iter()
                .find(|c| c.id == item_id)
                .ok_or_else(|| anyhow!("No saved paper with id {}", item_id))?;
            let exporter = ReferenceExporter::new(client, ".");
            println!("{}", exporter.format_one(item, &style).await?);
        }
        Command::Export { format, out, view } => {
            let store = CollectionStore::open(storage)?;
            let items: Vec<CollectionItem> = filter_view(store.items(), view.view()).into_iter().cloned().collect();
            let format = match format {
                ExportKind::Bibtex => ExportFormat::Bibtex,
                ExportKind::Ris => ExportFormat::Ris,
            };
            let path = ReferenceExporter::new(client, out).export(&items, format).await?;
            println!("Exported {} references to {}", items.len(), path.display());
        }
        Command::Check { file, no_ai } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let report = client
                .check_plagiarism(&text, !no_ai)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            print_json(&report)?;
        }
        Command::Trending { days, top_k } => {
            print_json(&client.trending_keywords(days, top_k).await?)?;
        }
        Command::History { limit } => {
            print_json(&client.search_history(limit).await?)?;
        }
        Command::Recommend { interest, limit } => {
            let recs = match interest {
                Some(interest) => client.recommendations_by_interest(&interest, limit).await?,
                None => client.personalized_recommendations(limit).await?,
            };
            print_json(&recs)?;
        }
        Command::Graph(cmd) => {
            let graph = match cmd {
                GraphCommand::Citations { doi, max_nodes } => client.citation_graph(&doi, max_nodes).await?,
                GraphCommand::Authors { author_id, limit } => client.author_network(&author_id, limit).await?,
                GraphCommand::Topic { keyword, years } => client.topic_evolution(&keyword, years).await?,
            };
            print_json(&graph)?;
        }
        Command::Register { email, username, password } => {
            let user = auth.register(&client, &email, &username, &password).await?;
            println!("Registered {}", user.username.as_deref().unwrap_or(&username));
        }
        Command::Login { username, password } => {
            let user = auth.login(&client, &username, &password).await?;
            println!("Logged in as {}", user.username.as_deref().unwrap_or(&username));
        }
        Command::Logout => {
            auth.logout()?;
            println!("Logged out.");
        }
        Command::Whoami => {
            if !auth.is_authenticated()? {
                println!("Not logged in.");
            } else {
                match auth.current_user(&client).await {
                    Ok(user) => print_json(&user)?,
                    Err(e) => {
                        tracing::warn!("Falling back to the stored user: {}", e);
                        match auth.stored_user()? {
                            Some(user) => print_json(&serde_json::to_value(user)?)?,
                            None => println!("Not logged in."),
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

async fn run_collection(cmd: CollectionCommand, client: &BackendClient, storage: LocalStorage) -> Result<()> {
    let mut store = CollectionStore::open(storage)?;

    match cmd {
        CollectionCommand::Add { doi, subject, group, yes } => {
            let raw = client
                .literature_by_doi(&doi)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            let paper = paper_from_lookup(&raw);
            let policy = if yes { CrossGroup::Allow } else { CrossGroup::Ask };
            match store.add_to_collection(&paper, subject, group, policy)? {
                AddOutcome::Added(item) => println!("Added \"{}\" to your collection (id {}).", item.title, item.id),
                AddOutcome::MissingTarget => println!("Please select a subject and group first."),
                AddOutcome::AlreadyInGroup => println!("This paper is already in this collection."),
                AddOutcome::NeedsConfirmation { existing_group_id, existing_group_name } => println!(
                    "This paper already exists in \"{}\". Re-run with --yes to add it here too.",
                    existing_group_name.unwrap_or_else(|| existing_group_id.to_string())
                ),
            }
        }
        CollectionCommand::Remove { key } => match store.remove_from_collection(&ItemKey::parse(&key))? {
            Some(item) => println!("Removed \"{}\".", item.title),
            None => println!("Nothing matched {}.", key),
        },
        CollectionCommand::Check { paper_id } => {
            println!("{}", store.check_collected(&paper_id));
        }
        CollectionCommand::BatchDelete { ids } => {
            let removed = store.batch_delete(&ids)?;
            println!("Deleted {} papers.", removed);
        }
        CollectionCommand::List { view, filter, page, per_page } => {
            let items = filter_text(filter_view(store.items(), view.view()), &filter);
            let mut pager = Paginator::new(per_page);
            pager.set_page(page);
            println!(
                "{} papers, page {}/{}",
                items.len(),
                pager.current_page(),
                pager.total_pages(items.len())
            );
            for item in pager.page(&items) {
                print_item(item);
            }
        }
        CollectionCommand::Find { title, threshold } => {
            for (item, dist) in find_by_title(store.items(), &title, threshold) {
                print!("(distance {}) ", dist);
                print_item(item);
            }
        }
    }
    Ok(())
}

fn run_subject(cmd: SubjectCommand, storage: LocalStorage) -> Result<()> {
    let mut tree = SubjectTree::load(storage)?;

    let changed = match cmd {
        SubjectCommand::List => {
            for subject in tree.subjects() {
                let marker = if subject.expanded { "v" } else { ">" };
                println!("{} [{}] {}", marker, subject.id, subject.name);
                if subject.expanded {
                    for group in &subject.items {
                        println!("    [{}] {}", group.id, group.name);
                    }
                }
            }
            return Ok(());
        }
        SubjectCommand::Add { name } => tree.add_subject(&name)?.map(|id| println!("Added subject {}", id)).is_some(),
        SubjectCommand::Rename { subject_id, name } => tree.rename_subject(subject_id, &name)?,
        SubjectCommand::Delete { subject_id } => tree.delete_subject(subject_id)?,
        SubjectCommand::Toggle { subject_id } => tree.toggle_subject(subject_id)?.is_some(),
        SubjectCommand::AddGroup { subject_id, name } => tree
            .add_group(subject_id, &name)?
            .map(|id| println!("Added group {}", id))
            .is_some(),
        SubjectCommand::RenameGroup { subject_id, group_id, name } => tree.rename_group(subject_id, group_id, &name)?,
        SubjectCommand::DeleteGroup { subject_id, group_id } => tree.delete_group(subject_id, group_id)?,
    };

    if !changed {
        println!("Nothing changed: unknown subject/group or blank name.");
    }
    Ok(())
}
