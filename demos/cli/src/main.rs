use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use lckb_core::{ClinicalDocument, LckbConfig};
use lckb_engine::{
    load_document, save_document, ChartSource, ClinicalEvent, CompiledRules, DocumentBuilder,
    DocumentUpdater, FhirBundleSource, FileStore, IngestReport, JsonDirectorySource, RuleSet,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "lckb-cli",
    about = "Dựng và cập nhật tài liệu lâm sàng LCKB từ hồ sơ bệnh nhân."
)]
struct Cli {
    /// Thư mục kho lưu tài liệu.
    #[arg(long, global = true, default_value = ".lckb")]
    store: PathBuf,
    /// Giới hạn dung lượng kho (byte).
    #[arg(long, global = true)]
    quota: Option<u64>,
    /// File JSON ghi đè một phần `LckbConfig`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// File JSON ghi đè bảng luật.
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dựng tài liệu đầy đủ từ hồ sơ rồi lưu vào kho.
    Build(BuildArgs),
    /// Nạp file sự kiện JSON-lines vào tài liệu đã lưu.
    Ingest {
        patient: String,
        /// Mỗi dòng một sự kiện có trường `type`.
        #[arg(short, long)]
        events: PathBuf,
    },
    /// In tóm tắt tài liệu đã lưu.
    Show { patient: String },
    /// Xóa bộ nhớ phiên, giữ dữ liệu hồ sơ.
    Reset { patient: String },
}

#[derive(Args, Debug)]
struct BuildArgs {
    patient: String,
    /// Thư mục chứa `<patient>.json` dạng hồ sơ JSON.
    #[arg(long, conflicts_with = "fhir", required_unless_present = "fhir")]
    chart_dir: Option<PathBuf>,
    /// Thư mục chứa `<patient>.json` dạng FHIR Bundle.
    #[arg(long)]
    fhir: Option<PathBuf>,
    /// Nạp lại hồ sơ vào tài liệu đã lưu; chỉ bản ghi chưa có mới được áp dụng.
    #[arg(long)]
    refresh: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Không đọc được file {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("JSON không hợp lệ trong {}", path.display()))
}

fn updater(cli: &Cli) -> anyhow::Result<DocumentUpdater> {
    let config = match &cli.config {
        Some(path) => read_json::<LckbConfig>(path)?,
        None => LckbConfig::default(),
    };
    let rules = match &cli.rules {
        Some(path) => CompiledRules::new(read_json::<RuleSet>(path)?)
            .with_context(|| format!("Bảng luật không hợp lệ: {}", path.display()))?,
        None => CompiledRules::builtin(),
    };
    Ok(DocumentUpdater::new(config, rules))
}

fn open_store(cli: &Cli) -> anyhow::Result<FileStore> {
    let store = FileStore::open(&cli.store)
        .with_context(|| format!("Không mở được kho {}", cli.store.display()))?;
    Ok(match cli.quota {
        Some(bytes) => store.with_quota(bytes),
        None => store,
    })
}

fn load(store: &FileStore, patient: &str) -> anyhow::Result<ClinicalDocument> {
    match load_document(store, patient, Utc::now())? {
        Some(doc) => Ok(doc),
        None => bail!("Chưa có tài liệu cho bệnh nhân {patient}; hãy chạy `build` trước"),
    }
}

fn save(store: &FileStore, doc: &ClinicalDocument) -> anyhow::Result<()> {
    save_document(store, doc, Utc::now())
        .with_context(|| format!("Không lưu được tài liệu {}", doc.patient_id()))
}

fn build(cli: &Cli, args: &BuildArgs) -> anyhow::Result<()> {
    let updater = updater(cli)?;
    let store = open_store(cli)?;
    let source: Box<dyn ChartSource> = match (&args.chart_dir, &args.fhir) {
        (Some(dir), _) => Box::new(JsonDirectorySource::new(dir)),
        (None, Some(dir)) => Box::new(FhirBundleSource::new(dir)),
        (None, None) => bail!("Cần --chart-dir hoặc --fhir"),
    };
    let builder = DocumentBuilder::new(source.as_ref(), &updater);

    let doc = if args.refresh {
        let mut doc = load(&store, &args.patient)?;
        let summary = builder.refresh(&mut doc)?;
        println!("Refreshed records: {}", summary.records());
        doc
    } else {
        builder.build_or_empty(&args.patient)
    };
    save(&store, &doc)?;
    print_summary(&doc);
    Ok(())
}

fn ingest(cli: &Cli, patient: &str, events: &Path) -> anyhow::Result<()> {
    let updater = updater(cli)?;
    let store = open_store(cli)?;
    let mut doc = load(&store, patient)?;
    let data = fs::read_to_string(events)
        .with_context(|| format!("Không đọc được file {}", events.display()))?;

    let mut total = IngestReport::default();
    let mut rejected = 0;
    for (line_no, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match ClinicalEvent::from_json(line, Utc::now()) {
            Ok(event) => total += updater.apply_event(&mut doc, event),
            Err(err) => {
                warn!(line = line_no + 1, error = %err, "skipping event");
                rejected += 1;
            }
        }
    }
    save(&store, &doc)?;
    info!(patient, records = total.records, rejected, "events ingested");
    println!(
        "Records: {}\nNew flags: {}\nNew conflicts: {}\nRejected lines: {rejected}",
        total.records, total.flags, total.conflicts
    );
    Ok(())
}

fn print_summary(doc: &ClinicalDocument) {
    println!(
        "Patient: {}\nLast updated: {}\nProblems: {}\nVitals readings: {}\nLab series: {}\nSafety flags: {}\nActive observations: {}\nOpen conflicts: {}",
        doc.patient_id(),
        doc.metadata.last_updated,
        doc.problem_matrix.problems.len(),
        doc.longitudinal.vitals.len(),
        doc.longitudinal.labs.len(),
        doc.session.safety_flags.len(),
        doc.session.active_observations().count(),
        doc.session.unresolved_conflicts().count(),
    );
    for flag in &doc.session.safety_flags {
        println!("  [{:?}] {}", flag.severity, flag.text);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Command::Build(args) => build(&cli, args)?,
        Command::Ingest { patient, events } => ingest(&cli, patient, events)?,
        Command::Show { patient } => print_summary(&load(&open_store(&cli)?, patient)?),
        Command::Reset { patient } => {
            let updater = updater(&cli)?;
            let store = open_store(&cli)?;
            let mut doc = load(&store, patient)?;
            updater.reset(&mut doc);
            save(&store, &doc)?;
            println!("Cleared session memory for {patient}");
        }
    }
    Ok(())
}
