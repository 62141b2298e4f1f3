use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use image::{Rgb, RgbImage};
use mjbot_contracts::tasks::TaskOption;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::client::{AccountInfo, ActionRequest, JobDescriptor, MidjourneyClient};
use crate::config::BotConfig;

const GRID_SIZE: u32 = 256;
const UPSCALE_SIZE: u32 = 192;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum JobShape {
    /// Four-image grid: exposes upscale, variation and reroll.
    Grid,
    /// Single image: exposes vary, zoom and pan.
    Single,
}

#[derive(Debug, Clone)]
struct KnownJob {
    hash: String,
    prompt: String,
}

/// Offline client producing Midjourney-shaped jobs and placeholder images.
///
/// Action tokens follow the `MJ::JOB::<action>::<index>::<hash>` layout and are
/// only accepted for the job that issued them.
#[derive(Debug)]
pub struct DryrunClient {
    out_dir: PathBuf,
    server_id: String,
    closed: AtomicBool,
    sequence: AtomicU64,
    jobs: Mutex<HashMap<String, KnownJob>>,
}

impl DryrunClient {
    pub fn connect(config: &BotConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.out_dir)
            .with_context(|| format!("failed to create {}", config.out_dir.display()))?;
        debug!(
            server_id = %config.server_id,
            channel_id = %config.channel_id,
            "dryrun client connected"
        );
        Ok(Self {
            out_dir: config.out_dir.clone(),
            server_id: config.server_id.clone(),
            closed: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            jobs: Mutex::new(HashMap::new()),
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("dryrun client is closed");
        }
        Ok(())
    }

    fn finish_job(&self, prompt: &str, shape: JobShape) -> Result<JobDescriptor> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = Uuid::new_v4().simple().to_string();
        let hash = content_hash(prompt, seq);
        let image_path = self.out_dir.join(format!("{id}.png"));
        write_placeholder(&image_path, prompt, seq, shape)?;

        self.jobs
            .lock()
            .map_err(|_| anyhow!("dryrun job table lock poisoned"))?
            .insert(
                id.clone(),
                KnownJob {
                    hash: hash.clone(),
                    prompt: prompt.to_string(),
                },
            );

        Ok(JobDescriptor {
            options: job_options(&hash, shape),
            proxy_url: file_url(&image_path),
            id,
            hash,
            flags: 0,
        })
    }

    fn known_job(&self, job_id: &str) -> Result<KnownJob> {
        self.jobs
            .lock()
            .map_err(|_| anyhow!("dryrun job table lock poisoned"))?
            .get(job_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown message id {job_id}"))
    }
}

impl MidjourneyClient for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn imagine(&self, prompt: &str) -> Result<JobDescriptor> {
        self.ensure_open()?;
        if prompt.trim().is_empty() {
            bail!("prompt is empty");
        }
        self.finish_job(prompt, JobShape::Grid)
    }

    fn blend(&self, urls: &[String]) -> Result<JobDescriptor> {
        self.ensure_open()?;
        if !(2..=5).contains(&urls.len()) {
            bail!("blend needs between 2 and 5 images, got {}", urls.len());
        }
        self.finish_job(&urls.join(" "), JobShape::Grid)
    }

    fn face_swap(&self, target_url: &str, source_url: &str) -> Result<JobDescriptor> {
        self.ensure_open()?;
        self.finish_job(&format!("{source_url} {target_url}"), JobShape::Single)
    }

    fn describe(&self, url: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let subject = url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("image");
        let subject = subject.split('.').next().unwrap_or(subject);
        Ok(["1️⃣", "2️⃣", "3️⃣", "4️⃣"]
            .iter()
            .zip([
                "in the style of soft watercolor",
                "cinematic lighting, 35mm",
                "flat vector illustration",
                "moody monochrome photograph",
            ])
            .map(|(marker, style)| format!("{marker} {subject}, {style} --ar 1:1"))
            .collect())
    }

    fn shorten(&self, prompt: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let words = prompt.split_whitespace().collect::<Vec<&str>>();
        if words.is_empty() {
            bail!("prompt is empty");
        }
        let mut out = Vec::new();
        for keep in [words.len(), words.len().div_ceil(2), words.len().div_ceil(3)] {
            let candidate = words[..keep.max(1)].join(" ");
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    fn info(&self) -> Result<AccountInfo> {
        self.ensure_open()?;
        let jobs = self.sequence.load(Ordering::SeqCst);
        let mut info = AccountInfo::new();
        info.insert(
            "subscription".to_string(),
            format!("Dryrun plan for server {} (renews <t:1767225600>)", self.server_id),
        );
        info.insert("jobMode".to_string(), "Fast".to_string());
        info.insert("visibilityMode".to_string(), "Public".to_string());
        info.insert("fastTimeRemaining".to_string(), "15.00/15.0 hours".to_string());
        info.insert("lifetimeUsage".to_string(), format!("{jobs} images"));
        info.insert("relaxedUsage".to_string(), "0 images".to_string());
        info.insert("queuedJobsFast".to_string(), "0".to_string());
        info.insert("queuedJobsRelax".to_string(), "0".to_string());
        info.insert("runningJobs".to_string(), "None".to_string());
        Ok(info)
    }

    fn invoke_action(&self, request: &ActionRequest) -> Result<JobDescriptor> {
        self.ensure_open()?;
        let job = self.known_job(&request.job_id)?;
        let action = parse_token(&request.custom, &job.hash)?;
        let shape = if action == "upsample" {
            JobShape::Single
        } else {
            JobShape::Grid
        };
        self.finish_job(&job.prompt, shape)
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn job_options(hash: &str, shape: JobShape) -> Vec<TaskOption> {
    match shape {
        JobShape::Grid => {
            let mut options = (1..=4)
                .map(|idx| TaskOption::new(format!("U{idx}"), format!("MJ::JOB::upsample::{idx}::{hash}")))
                .collect::<Vec<TaskOption>>();
            options.push(TaskOption::new("🔄", format!("MJ::JOB::reroll::0::{hash}::SOLO")));
            options.extend((1..=4).map(|idx| {
                TaskOption::new(format!("V{idx}"), format!("MJ::JOB::variation::{idx}::{hash}"))
            }));
            options
        }
        JobShape::Single => [
            ("Vary (Strong)", "high_variation"),
            ("Vary (Subtle)", "low_variation"),
            ("Zoom Out 2x", "outpaint_50"),
            ("Zoom Out 1.5x", "outpaint_75"),
            ("Custom Zoom", "custom_zoom"),
            ("⬅️", "pan_left"),
            ("➡️", "pan_right"),
            ("⬆️", "pan_up"),
            ("⬇️", "pan_down"),
        ]
        .into_iter()
        .map(|(label, action)| TaskOption::new(label, format!("MJ::JOB::{action}::1::{hash}::SOLO")))
        .collect(),
    }
}

/// Returns the action name if `token` was issued for the job with `hash`.
fn parse_token<'a>(token: &'a str, hash: &str) -> Result<&'a str> {
    let mut parts = token.split("::");
    if parts.next() != Some("MJ") || parts.next() != Some("JOB") {
        bail!("malformed action token {token}");
    }
    let action = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("malformed action token {token}"))?;
    let _index = parts.next();
    if parts.next() != Some(hash) {
        bail!("action token {token} does not belong to this job");
    }
    Ok(action)
}

fn content_hash(prompt: &str, seq: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seq.to_be_bytes());
    hex::encode(&hasher.finalize()[..16])
}

fn color_for(prompt: &str, seq: u64, quadrant: u8) -> Rgb<u8> {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seq.to_be_bytes());
    hasher.update([quadrant]);
    let digest = hasher.finalize();
    Rgb([digest[0], digest[1], digest[2]])
}

fn write_placeholder(path: &Path, prompt: &str, seq: u64, shape: JobShape) -> Result<()> {
    let image = match shape {
        JobShape::Grid => {
            let half = GRID_SIZE / 2;
            RgbImage::from_fn(GRID_SIZE, GRID_SIZE, |x, y| {
                let quadrant = u8::from(x >= half) + 2 * u8::from(y >= half);
                color_for(prompt, seq, quadrant)
            })
        }
        JobShape::Single => {
            let color = color_for(prompt, seq, 0);
            RgbImage::from_pixel(UPSCALE_SIZE, UPSCALE_SIZE, color)
        }
    };
    image
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    Ok(())
}

fn file_url(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    reqwest::Url::from_file_path(&absolute)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| absolute.display().to_string())
}

#[cfg(test)]
mod tests {
    use mjbot_contracts::tasks::{select_option, TaskRecord};

    use super::{parse_token, DryrunClient};
    use crate::client::{ActionRequest, MidjourneyClient};
    use crate::config::tests::config_for_test;

    fn as_record(job: &crate::client::JobDescriptor) -> TaskRecord {
        TaskRecord {
            id: 1,
            owner_id: "u".to_string(),
            remote_job_id: job.id.clone(),
            content_hash: job.hash.clone(),
            flags: job.flags,
            prompt: String::new(),
            options: job.options.clone(),
            created_at: String::new(),
        }
    }

    #[test]
    fn imagine_returns_grid_options_and_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let client = DryrunClient::connect(&config_for_test(temp.path()))?;
        let job = client.imagine("a red fox")?;

        let labels = job
            .options
            .iter()
            .map(|option| option.label.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(
            labels,
            vec!["U1", "U2", "U3", "U4", "🔄", "V1", "V2", "V3", "V4"]
        );
        assert!(job.proxy_url.starts_with("file://"));
        assert!(client.out_dir().join(format!("{}.png", job.id)).exists());
        Ok(())
    }

    #[test]
    fn upscale_token_yields_single_image_options() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let client = DryrunClient::connect(&config_for_test(temp.path()))?;
        let grid = client.imagine("a red fox")?;
        let token = select_option(&as_record(&grid), "U2").unwrap_or_default().to_string();

        let single = client.invoke_action(&ActionRequest {
            job_id: grid.id.clone(),
            custom: token,
            flags: grid.flags,
        })?;
        let record = as_record(&single);
        assert!(select_option(&record, "Vary (Strong)").is_some());
        assert!(select_option(&record, "Zoom Out 1.5x").is_some());
        assert!(select_option(&record, "➡️").is_some());
        assert!(select_option(&record, "U1").is_none());
        Ok(())
    }

    #[test]
    fn tokens_are_bound_to_their_job() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let client = DryrunClient::connect(&config_for_test(temp.path()))?;
        let first = client.imagine("a red fox")?;
        let second = client.imagine("a blue owl")?;
        let foreign = select_option(&as_record(&first), "V1")
            .unwrap_or_default()
            .to_string();

        let result = client.invoke_action(&ActionRequest {
            job_id: second.id.clone(),
            custom: foreign,
            flags: 0,
        });
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn closed_client_rejects_calls() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let client = DryrunClient::connect(&config_for_test(temp.path()))?;
        client.close()?;
        assert!(client.imagine("a red fox").is_err());
        assert!(client.info().is_err());
        Ok(())
    }

    #[test]
    fn connect_refuses_incomplete_config() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut config = config_for_test(temp.path());
        config.channel_id.clear();
        assert!(DryrunClient::connect(&config).is_err());
        Ok(())
    }

    #[test]
    fn parse_token_checks_shape_and_hash() {
        assert_eq!(
            parse_token("MJ::JOB::upsample::2::abc", "abc").ok(),
            Some("upsample")
        );
        assert!(parse_token("MJ::JOB::upsample::2::abc", "def").is_err());
        assert!(parse_token("garbage", "abc").is_err());
    }

    #[test]
    fn shorten_and_describe_return_suggestions() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let client = DryrunClient::connect(&config_for_test(temp.path()))?;
        let shortened = client.shorten("a very detailed red fox in snow")?;
        assert_eq!(shortened[0], "a very detailed red fox in snow");
        assert!(shortened.len() >= 2);

        let described = client.describe("https://example.com/images/fox.png")?;
        assert_eq!(described.len(), 4);
        assert!(described[0].contains("fox"));
        Ok(())
    }
}
