use kanjian::{
  frame::RgbFrame,
  model::decode::{BoxLayout, DetectionDecoder, OutputOrder},
  output::draw::{PixelRect, scale_bbox},
  tensor::{Normalization, PreprocessError, Tensor, TensorLayout, preprocess, to_planar},
};

#[test]
fn normalized_output_matches_input_length_and_range() {
  for (h, w) in [(1usize, 1usize), (7, 5), (224, 224)] {
    let bytes: Vec<u8> = (0..3 * h * w).map(|i| (i * 31 % 256) as u8).collect();
    let out = to_planar(&bytes, 3, h, w, Normalization::default()).expect("planar");
    assert_eq!(out.len(), bytes.len());
    assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
  }
}

#[test]
fn preprocess_builds_planar_tensor() {
  // 2x2 图像, 每个像素 (r, g, b) = (i, 100 + i, 200 + i)
  let data = (0..4u8).flat_map(|i| [i, 100 + i, 200 + i]).collect();
  let frame = RgbFrame::new(2, 2, data).expect("frame");
  let norm = Normalization { mean: 0.0, std: 1.0 };

  let tensor = preprocess(&frame, TensorLayout::Nchw, norm).expect("nchw");
  assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
  assert_eq!(
    tensor.data(),
    &[0.0, 1.0, 2.0, 3.0, 100.0, 101.0, 102.0, 103.0, 200.0, 201.0, 202.0, 203.0]
  );

  let tensor = preprocess(&frame, TensorLayout::Nhwc, norm).expect("nhwc");
  assert_eq!(tensor.shape(), &[1, 2, 2, 3]);
  assert_eq!(&tensor.data()[..3], &[0.0, 100.0, 200.0]);
}

#[test]
fn mismatched_length_is_rejected() {
  let err = to_planar(&[0u8; 100], 3, 224, 224, Normalization::default()).expect_err("mismatch");
  assert!(matches!(
    err,
    PreprocessError::ShapeMismatch {
      expected: 150528,
      actual: 100
    }
  ));
}

#[test]
fn decode_keeps_strictly_above_threshold_in_input_order() {
  let scores = [0.2f32, 0.5, 0.500001, 0.99, 0.7, 0.5];
  let data: Vec<f32> = scores
    .iter()
    .enumerate()
    .flat_map(|(i, &s)| [0.0, 0.0, 1.0, 1.0, s, i as f32])
    .collect();
  let output = Tensor::new(vec![1, scores.len(), 6], data).expect("tensor");

  let decoder = DetectionDecoder::new(BoxLayout::BoxScoreClass, OutputOrder::BoxMajor, 0.5);
  let result = decoder.decode(&output, None).expect("decode");
  let classes: Vec<usize> = result.items.iter().map(|item| item.class_id).collect();
  assert_eq!(classes, vec![2, 3, 4]);
}

#[test]
fn box_scaling_is_linear_in_surface_size() {
  let bbox = [0.1, 0.1, 0.5, 0.5];
  assert_eq!(
    scale_bbox(&bbox, 1000, 1000),
    PixelRect {
      x_min: 100,
      y_min: 100,
      x_max: 500,
      y_max: 500
    }
  );
  assert_eq!(
    scale_bbox(&bbox, 2000, 500),
    PixelRect {
      x_min: 200,
      y_min: 50,
      x_max: 1000,
      y_max: 250
    }
  );
}
