use face_attendance::{
    attendance::{self, AttendanceField, AttendanceSummary, CaptureMethod, JsonLinesStore, RecordStore},
    cli::annotate_detections,
    common::{Config, DataLayout, DevMode},
    core::MatchDecision,
    service::{FaceRecognitionService, FaceWorker},
    storage::{FileKeyStore, PhotoStore},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "face-attendance")]
#[command(about = "On-device face matching for class attendance")]
struct Cli {
    /// Enable development mode (keeps photos, keys and models under ./dev_data)
    #[arg(long, global = true)]
    dev: bool,

    /// Configuration file to use instead of the system one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a student's reference photo
    Register {
        #[arg(short, long)]
        id: String,
        #[arg(short = 'm', long)]
        image: PathBuf,
    },
    /// Verify a captured photo against a registered student
    Verify {
        #[arg(short, long)]
        id: String,
        #[arg(short = 'm', long)]
        image: PathBuf,
        /// Record the result as attendance for this course
        #[arg(long)]
        course: Option<String>,
        /// User id of whoever is taking attendance
        #[arg(long, default_value = "cli")]
        captured_by: String,
    },
    /// Print the similarity between the main faces of two images
    Compare {
        first: PathBuf,
        second: PathBuf,
    },
    /// Detect faces and save an annotated copy of the image
    Detect {
        #[arg(short = 'm', long)]
        image: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List registered students
    List,
    /// Remove a student's reference photo
    Remove {
        #[arg(short, long)]
        id: String,
    },
    /// Attendance records
    Attendance {
        #[command(subcommand)]
        command: AttendanceCommands,
    },
}

#[derive(Subcommand)]
enum AttendanceCommands {
    /// Mark students present (or absent) for a course
    Mark {
        #[arg(long)]
        course: String,
        #[arg(required = true)]
        students: Vec<String>,
        #[arg(long)]
        absent: bool,
        /// Record as manual entry rather than face recognition
        #[arg(long)]
        manual: bool,
        #[arg(long, default_value = "cli")]
        captured_by: String,
    },
    /// Attendance totals for one student
    Summary {
        #[arg(long)]
        student: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on mode
    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;
    let config = Config::load(cli.config.as_deref())?;
    let layout = DataLayout::resolve(&config, &dev_mode)?;

    match cli.command {
        Commands::Register { id, image } => {
            println!("Registering student: {}", id);
            let image = open_image(&image)?;
            let service = build_service(&config, &layout)?;

            let mut worker = FaceWorker::spawn(service)?;
            worker.submit_register(&id, image)?;
            let outcome = worker.recv().context("Face worker stopped before replying")?;

            if outcome.success {
                println!("✅ Reference photo stored for {}", outcome.identity);
            } else {
                bail!("Registration failed for {}", outcome.identity);
            }
        }
        Commands::Verify { id, image, course, captured_by } => {
            println!("Verifying student: {}", id);
            let image = open_image(&image)?;
            let service = build_service(&config, &layout)?;

            let mut worker = FaceWorker::spawn(service)?;
            worker.submit_verify(&id, image)?;
            let outcome = worker.recv().context("Face worker stopped before replying")?;

            println!("Match: {}", if outcome.success { "SUCCESS" } else { "FAILED" });

            if let Some(course) = course {
                let store = JsonLinesStore::new(layout.attendance_ledger.clone())?;
                let records = attendance::mark_attendance(
                    &course,
                    &[outcome.identity.clone()],
                    outcome.success,
                    &captured_by,
                    CaptureMethod::FaceRecognition,
                );
                store.put_all(&records)?;
                println!(
                    "Recorded {} for {} in {}",
                    if outcome.success { "presence" } else { "absence" },
                    outcome.identity,
                    course
                );
            }
        }
        Commands::Compare { first, second } => {
            let service = build_service(&config, &layout)?;
            if !service.is_initialized() {
                bail!("Face recognition models could not be loaded");
            }

            let first_embedding = service
                .extract_embedding(&open_image(&first)?)
                .with_context(|| format!("No face found in {:?}", first))?;
            let second_embedding = service
                .extract_embedding(&open_image(&second)?)
                .with_context(|| format!("No face found in {:?}", second))?;

            let decision = MatchDecision::compare(&first_embedding, &second_embedding, service.threshold());
            println!("Similarity: {:.4} (threshold {})", decision.similarity, decision.threshold);
            println!("Same person: {}", if decision.matched { "yes" } else { "no" });
        }
        Commands::Detect { image, output } => {
            let frame = open_image(&image)?;
            let service = build_service(&config, &layout)?;
            let faces = service
                .detect(&frame)
                .context("Face recognition models could not be loaded")?;

            println!("Detected {} face(s)", faces.len());
            for (i, face) in faces.iter().enumerate() {
                println!(
                    "  {}: ({:.0}, {:.0}) - ({:.0}, {:.0}) confidence {:.2}",
                    i, face.x1, face.y1, face.x2, face.y2, face.confidence
                );
            }

            let output = match output {
                Some(path) => path,
                None => {
                    std::fs::create_dir_all(&layout.debug_dir)?;
                    layout.debug_path("detections")
                }
            };
            annotate_detections(&frame, &faces).save(&output)?;
            println!("Saved annotated image to {:?}", output);
        }
        Commands::List => {
            let store = open_photo_store(&config, &layout)?;
            let students = store.list()?;
            if students.is_empty() {
                println!("No students registered");
            }
            for student in students {
                println!("{}", student);
            }
        }
        Commands::Remove { id } => {
            let store = open_photo_store(&config, &layout)?;
            if store.delete(&id)? {
                println!("Removed reference photo for {}", id);
            } else {
                println!("No reference photo stored for {}", id);
            }
        }
        Commands::Attendance { command } => {
            let store = JsonLinesStore::new(layout.attendance_ledger.clone())?;
            match command {
                AttendanceCommands::Mark { course, students, absent, manual, captured_by } => {
                    let method = if manual {
                        CaptureMethod::ManualEntry
                    } else {
                        CaptureMethod::FaceRecognition
                    };
                    let records = attendance::mark_attendance(&course, &students, !absent, &captured_by, method);
                    store.put_all(&records)?;
                    println!("Recorded {} attendance record(s) for {}", records.len(), course);
                }
                AttendanceCommands::Summary { student } => {
                    let records = store.query(AttendanceField::StudentId, &student)?;
                    let summary = AttendanceSummary::from_records(&records);
                    println!("Attendance for {}", student);
                    println!("  Sessions: {}", summary.total_sessions);
                    println!("  Present:  {}", summary.present_sessions);
                    println!("  Absences: {}", summary.absences);
                    println!("  Rate:     {:.1}%", summary.attendance_rate * 100.0);
                }
            }
        }
    }

    Ok(())
}

fn open_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("Failed to open image {:?}", path))
}

fn open_photo_store(config: &Config, layout: &DataLayout) -> Result<PhotoStore> {
    let keys = Arc::new(FileKeyStore::new(layout.key_file.clone()));
    Ok(PhotoStore::new(layout.photo_dir.clone(), keys, config.storage.jpeg_quality)?)
}

fn build_service(config: &Config, layout: &DataLayout) -> Result<Arc<FaceRecognitionService>> {
    let store = open_photo_store(config, layout)?;
    Ok(Arc::new(FaceRecognitionService::new(config, store, layout.models_dir.clone())))
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
