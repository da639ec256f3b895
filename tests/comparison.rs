// 该文件是 Luoshuan （螺栓） 项目的一部分。
// tests/comparison.rs - 多模型对比集成测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use image::{Rgb, RgbImage};
use luoshuan::{
  adapter::InferenceAdapter,
  compare::{ComparisonOrchestrator, ModelState},
  config::ModelEntry,
  model::{DetectItem, DetectResult, Model},
  output::{
    DirectoryRecordOutput, Render, SUMMARY_FILE,
    composite::{CompositeRenderer, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, footer_height},
    composite_file_name,
    draw::{Draw, load_font},
  },
  registry::ModelRegistry,
  task::{CompareTask, Task},
};

enum Fake {
  /// 返回固定的检测结果
  Fixed(Vec<f32>),
  /// 图像中存在非黑色像素时报告一个目标
  Bright,
  Failing,
  Counting(Arc<AtomicUsize>),
}

impl Model for Fake {
  type Error = std::io::Error;

  fn infer(&self, input: &RgbImage, _threshold: f32) -> Result<DetectResult, Self::Error> {
    let scores = match self {
      Fake::Fixed(scores) => scores.clone(),
      Fake::Bright => {
        if input.pixels().any(|p| p.0 != [0, 0, 0]) {
          vec![0.8]
        } else {
          vec![]
        }
      }
      Fake::Failing => return Err(std::io::Error::other("weights corrupted")),
      Fake::Counting(calls) => {
        calls.fetch_add(1, Ordering::SeqCst);
        vec![]
      }
    };
    let items = scores
      .into_iter()
      .enumerate()
      .map(|(i, score)| DetectItem {
        class_id: i as u32,
        class_name: format!("class_{}", i),
        score,
        bbox: [0.1, 0.1, 0.5, 0.5],
      })
      .collect::<Vec<_>>();
    Ok(DetectResult {
      items: items.into_boxed_slice(),
      elapsed_ms: Some(3.0),
    })
  }
}

fn orchestrator(models: Vec<(&str, Fake)>) -> ComparisonOrchestrator<Fake> {
  let entries: Vec<ModelEntry> = models
    .iter()
    .map(|(name, _)| ModelEntry::new(*name, "unused.onnx"))
    .collect();
  let mut fakes = models.into_iter().map(|(_, fake)| fake);
  let registry = ModelRegistry::try_from_entries(&entries, |_| {
    fakes.next().ok_or_else(|| std::io::Error::other("missing fake"))
  })
  .unwrap();

  let font = load_font(None).unwrap();
  ComparisonOrchestrator::new(
    registry,
    InferenceAdapter::new(Draw::new(font.clone())),
    CompositeRenderer::new(font),
  )
}

fn gray(width: u32, height: u32) -> RgbImage {
  RgbImage::from_pixel(width, height, Rgb([120, 120, 120]))
}

#[test]
fn failing_model_does_not_stop_others() {
  let orchestrator = orchestrator(vec![
    ("YOLOv8", Fake::Fixed(vec![0.9, 0.6])),
    ("Broken", Fake::Failing),
    ("Faster R-CNN", Fake::Fixed(vec![0.7])),
  ]);
  let run = orchestrator.run(gray(40, 30), 0.5);

  let names: Vec<&str> = run.results.iter().map(|r| r.model_name.as_str()).collect();
  assert_eq!(names, ["YOLOv8", "Broken", "Faster R-CNN"]);

  let states: Vec<ModelState> = run.results.iter().map(|r| r.state()).collect();
  assert_eq!(
    states,
    [ModelState::Succeeded, ModelState::Failed, ModelState::Succeeded]
  );
  assert_eq!(run.failed(), 1);

  let broken = &run.results[1];
  assert_eq!(broken.error(), Some("weights corrupted"));
  assert!(broken.annotated_image().is_none());
  assert!(broken.detections().is_empty());
  assert_eq!(broken.elapsed_ms(), 0.0);
  assert_eq!(
    broken.composite.dimensions(),
    (DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT + footer_height(0))
  );
  assert_eq!(broken.header, "Error with Broken");

  assert_eq!(run.results[0].header, "YOLOv8 | 2 object(s) | 3.0 ms");
  assert_eq!(run.results[2].header, "Faster R-CNN | 1 object(s) | 3.0 ms");
}

#[test]
fn success_header_counts_filtered_detections() {
  let orchestrator = orchestrator(vec![("fixed", Fake::Fixed(vec![0.2, 0.6, 0.95]))]);

  let run = orchestrator.run(gray(8, 8), 0.5);
  assert_eq!(run.results[0].header, "fixed | 2 object(s) | 3.0 ms");

  let run = orchestrator.run(gray(8, 8), 0.99);
  assert_eq!(run.results[0].header, "fixed | 0 object(s) | 3.0 ms");
  assert!(!run.results[0].header.contains("Error"));
}

#[test]
fn composite_height_follows_detection_count() {
  let orchestrator = orchestrator(vec![
    ("none", Fake::Fixed(vec![])),
    ("two", Fake::Fixed(vec![0.9, 0.8])),
    ("four", Fake::Fixed(vec![0.9, 0.8, 0.7, 0.6])),
  ]);
  let run = orchestrator.run(gray(40, 30), 0.5);

  let heights: Vec<u32> = run.composites().map(|c| c.height()).collect();
  assert_eq!(heights, [30 + 65, 30 + 40 + 50, 30 + 40 + 100]);
  assert!(run.composites().all(|c| c.width() == 40));
}

#[test]
fn black_image_has_no_detections() {
  let orchestrator = orchestrator(vec![("bright", Fake::Bright)]);

  let run = orchestrator.run(RgbImage::new(16, 16), 0.3);
  assert_eq!(run.results[0].state(), ModelState::Succeeded);
  assert!(run.results[0].detections().is_empty());
  assert_eq!(run.results[0].composite.height(), 16 + footer_height(0));

  let run = orchestrator.run(gray(16, 16), 0.3);
  assert_eq!(run.results[0].detections().len(), 1);
}

#[test]
fn higher_threshold_never_adds_detections() {
  let orchestrator = orchestrator(vec![("fixed", Fake::Fixed(vec![0.1, 0.3, 0.5, 0.7, 0.9]))]);
  let counts: Vec<usize> = (0..=10)
    .map(|step| {
      let run = orchestrator.run(gray(8, 8), step as f32 / 10.0);
      run.results[0].detections().len()
    })
    .collect();

  assert!(counts.windows(2).all(|w| w[0] >= w[1]), "{:?}", counts);
  assert_eq!(counts[0], 5);
  assert_eq!(counts[10], 0);
}

#[test]
fn unreadable_input_runs_no_model() {
  let calls = Arc::new(AtomicUsize::new(0));
  let orchestrator = orchestrator(vec![("counting", Fake::Counting(calls.clone()))]);

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("broken.jpg");
  std::fs::write(&path, b"not a jpeg").unwrap();

  assert!(orchestrator.run_path(&path, 0.3).is_err());
  assert!(orchestrator.run_path(dir.path().join("missing.png"), 0.3).is_err());
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  let good = dir.path().join("good.png");
  gray(8, 8).save(&good).unwrap();
  let run = orchestrator.run_path(&good, 0.3).unwrap();
  assert_eq!(run.results.len(), 1);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn directory_output_writes_composites_and_summary() {
  let orchestrator = orchestrator(vec![
    ("YOLOv8", Fake::Fixed(vec![0.9])),
    ("Faster R-CNN", Fake::Failing),
  ]);
  let dir = tempfile::tempdir().unwrap();
  let output = DirectoryRecordOutput::new(dir.path().join("results"));

  let run = CompareTask::new(0.5)
    .run_task(gray(20, 10), &orchestrator, output)
    .unwrap();
  assert_eq!(run.results.len(), 2);

  let results = dir.path().join("results");
  for (index, result) in run.results.iter().enumerate() {
    let path = results.join(composite_file_name(index, &result.model_name));
    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved, result.composite);
  }

  let text = std::fs::read_to_string(results.join(SUMMARY_FILE)).unwrap();
  let summary: serde_json::Value = serde_json::from_str(&text).unwrap();
  assert_eq!(summary["threshold"], 0.5);
  assert_eq!(summary["image_width"], 20);
  assert_eq!(summary["image_height"], 10);

  let models = summary["models"].as_array().unwrap();
  assert_eq!(models[0]["name"], "YOLOv8");
  assert_eq!(models[0]["status"], "succeeded");
  assert_eq!(models[0]["elapsed_ms"], 3.0);
  assert_eq!(models[0]["composite"], "01_YOLOv8.png");
  assert_eq!(models[0]["detections"].as_array().unwrap().len(), 1);
  assert!(models[0].get("error").is_none());

  assert_eq!(models[0]["header"], "YOLOv8 | 1 object(s) | 3.0 ms");

  assert_eq!(models[1]["status"], "failed");
  assert_eq!(models[1]["header"], "Error with Faster R-CNN");
  assert_eq!(models[1]["error"], "weights corrupted");
  assert_eq!(models[1]["composite"], "02_Faster_R-CNN.png");
}

#[test]
fn render_directly_from_run() {
  let orchestrator = orchestrator(vec![("only", Fake::Fixed(vec![]))]);
  let run = orchestrator.run(gray(4, 4), 0.3);
  let dir = tempfile::tempdir().unwrap();
  DirectoryRecordOutput::new(dir.path())
    .render_result(&run)
    .unwrap();
  assert!(dir.path().join("01_only.png").exists());
  assert!(dir.path().join(SUMMARY_FILE).exists());
}
