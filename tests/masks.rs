use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array3, Array4, ArrayD, ArrayViewD, IxDyn};
use tract_mask::{
    Affine, CombineOp, CombinedMask, DType, DatasetQuery, DiffusionAccess, DwiImage, FileQuery,
    Image, ImageLoader, Mask, MaskArray, MaskContext, MaskError, MaskMeta, MaskSettings,
    Resampler, Row, Scalar, SourceMask, TrilinearResampler,
};

#[derive(Default)]
struct Dataset {
    files: HashMap<(String, String, String), Vec<PathBuf>>,
}

impl Dataset {
    fn with(mut self, subject: &str, session: &str, suffix: &str, paths: &[&str]) -> Self {
        self.files.insert(
            (subject.into(), session.into(), suffix.into()),
            paths.iter().map(PathBuf::from).collect(),
        );
        self
    }
}

impl DatasetQuery for Dataset {
    fn query(&self, query: &FileQuery<'_>) -> Result<Vec<PathBuf>, MaskError> {
        assert_eq!(query.extension, ".nii.gz");
        Ok(self
            .files
            .get(&(
                query.subject.to_string(),
                query.session.to_string(),
                query.suffix.to_string(),
            ))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct Loader {
    images: HashMap<PathBuf, Image>,
}

impl Loader {
    fn with(mut self, path: &str, data: MaskArray, affine: Affine) -> Self {
        self.images.insert(PathBuf::from(path), Image::new(data, affine));
        self
    }
}

impl ImageLoader for Loader {
    fn load(&self, path: &Path) -> Result<Image, MaskError> {
        self.images.get(path).cloned().ok_or_else(|| MaskError::Image {
            path: path.to_path_buf(),
            reason: "not found".into(),
        })
    }
}

struct Diffusion {
    dwi: Arc<DwiImage>,
    scalars: Vec<Scalar>,
}

impl Diffusion {
    fn new(shape: (usize, usize, usize, usize)) -> Self {
        Self {
            dwi: Arc::new(DwiImage::new(
                Array4::<f64>::zeros(shape).into_dyn(),
                Affine::identity(),
            )),
            scalars: Scalar::ALL.to_vec(),
        }
    }
}

impl DiffusionAccess for Diffusion {
    fn dwi(&self, _row: &Row) -> Result<Arc<DwiImage>, MaskError> {
        Ok(Arc::clone(&self.dwi))
    }

    fn scalar_path(&self, scalar: Scalar, row: &Row) -> Result<PathBuf, MaskError> {
        Ok(PathBuf::from(format!(
            "sub-{}_ses-{}_{scalar}.nii.gz",
            row.subject, row.session
        )))
    }

    fn available_scalars(&self) -> &[Scalar] {
        &self.scalars
    }
}

#[derive(Default)]
struct CountingResampler {
    calls: AtomicUsize,
}

impl Resampler for CountingResampler {
    fn resample(
        &self,
        source: &ArrayViewD<'_, f64>,
        reference: &ArrayViewD<'_, f64>,
        source_affine: &Affine,
        reference_affine: &Affine,
    ) -> Result<ArrayD<f64>, MaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TrilinearResampler.resample(source, reference, source_affine, reference_affine)
    }
}

/// Mask with fixed data, standing in for a third-party implementation.
#[derive(Debug)]
struct FixedMask(ArrayD<bool>);

impl Mask for FixedMask {
    fn name(&self) -> String {
        "fixed".into()
    }

    fn find_path(&mut self, _: &dyn DatasetQuery, _: &str, _: &str) -> Result<(), MaskError> {
        Ok(())
    }

    fn get_mask(&self, _: &MaskContext<'_>, _: &Row) -> Result<(MaskArray, MaskMeta), MaskError> {
        Ok((
            MaskArray::Bool(self.0.clone()),
            MaskMeta::Source {
                source: "fixed".into(),
            },
        ))
    }
}

fn row() -> Row {
    Row::new("01", "pre")
}

fn aseg() -> MaskArray {
    MaskArray::Label(Array3::from_shape_fn((4, 4, 4), |(i, j, _)| ((i + j) % 4) as i64).into_dyn())
}

fn scalar_map(shape: (usize, usize, usize), f: impl Fn(usize, usize, usize) -> f64) -> MaskArray {
    MaskArray::Float(Array3::from_shape_fn(shape, |(i, j, k)| f(i, j, k)).into_dyn())
}

fn bools(mask: &MaskArray) -> &ArrayD<bool> {
    match mask {
        MaskArray::Bool(data) => data,
        other => panic!("expected boolean mask, got {:?}", other.dtype()),
    }
}

#[test]
fn labelled_file_selects_inclusive_labels() {
    let dataset = Dataset::default().with("01", "pre", "aseg", &["sub-01_aseg.nii.gz"]);
    let loader = Loader::default().with("sub-01_aseg.nii.gz", aseg(), Affine::identity());
    let diffusion = Diffusion::new((4, 4, 4, 10));
    let resampler = CountingResampler::default();
    let ctx = MaskContext::new(&diffusion, &loader).with_resampler(&resampler);

    let mut mask = SourceMask::labelled_file(
        "aseg",
        Some("dmriprep".into()),
        Some(vec![1, 2]),
        None,
        CombineOp::Or,
    );
    mask.find_path(&dataset, "01", "pre").unwrap();
    let (data, meta) = mask.get_mask(&ctx, &row()).unwrap();

    let MaskArray::Label(labels) = aseg() else {
        unreachable!()
    };
    let expected = labels.mapv(|v| v == 1 || v == 2);
    assert_eq!(bools(&data), &expected);
    assert_eq!(resampler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        meta,
        MaskMeta::Labels {
            source: "sub-01_aseg.nii.gz".into(),
            inclusive_labels: Some(vec![1, 2]),
            exclusive_labels: None,
            combined_with: CombineOp::Or,
        }
    );
}

#[test]
fn get_mask_before_find_path_is_a_lookup_error() {
    let loader = Loader::default();
    let diffusion = Diffusion::new((4, 4, 4, 10));
    let ctx = MaskContext::new(&diffusion, &loader);

    let mask = SourceMask::file("WM_mask", Some("dmriprep".into()));
    let err = mask.get_mask(&ctx, &row()).unwrap_err();
    assert!(err.is_lookup(), "unexpected error: {err}");
    assert!(matches!(err, MaskError::PathNotResolved { .. }));
}

#[test]
fn paths_are_cached_per_subject_and_session() {
    let dataset = Dataset::default()
        .with("01", "pre", "WM_mask", &["a.nii.gz"])
        .with("02", "pre", "WM_mask", &["b.nii.gz", "c.nii.gz"]);
    let loader = Loader::default()
        .with("a.nii.gz", scalar_map((4, 4, 4), |_, _, _| 0.25), Affine::identity())
        .with("b.nii.gz", scalar_map((4, 4, 4), |_, _, _| 0.75), Affine::identity());
    let diffusion = Diffusion::new((4, 4, 4, 10));
    let ctx = MaskContext::new(&diffusion, &loader);

    let mut mask = SourceMask::file("WM_mask", None);
    mask.find_path(&dataset, "01", "pre").unwrap();
    mask.find_path(&dataset, "02", "pre").unwrap();

    let (first, meta) = mask.get_mask(&ctx, &Row::new("01", "pre")).unwrap();
    let (second, _) = mask.get_mask(&ctx, &Row::new("02", "pre")).unwrap();
    assert_eq!(first.dtype(), DType::Float);
    assert!(first.to_f64().iter().all(|&v| v == 0.25));
    assert!(second.to_f64().iter().all(|&v| v == 0.75));
    assert_eq!(
        meta,
        MaskMeta::Source {
            source: "a.nii.gz".into()
        }
    );

    let (again, _) = mask.get_mask(&ctx, &Row::new("01", "pre")).unwrap();
    assert_eq!(again, first);
    assert!(mask.get_mask(&ctx, &Row::new("01", "post")).is_err());
}

#[test]
fn missing_dataset_file_fails_find_path() {
    let dataset = Dataset::default();
    let mut mask = SourceMask::thresholded_file("brain_mask", None, Some(0.1), None, CombineOp::And);
    let err = mask.find_path(&dataset, "01", "pre").unwrap_err();
    assert!(matches!(err, MaskError::NoMatchingFile { .. }));
}

#[test]
fn combined_scalar_thresholds_match_independent_children() {
    let fa = scalar_map((5, 5, 5), |i, _, _| i as f64 * 0.1);
    let md = scalar_map((5, 5, 5), |_, j, _| j as f64 * 0.001);
    let loader = Loader::default()
        .with("sub-01_ses-pre_dti_fa.nii.gz", fa, Affine::identity())
        .with("sub-01_ses-pre_dti_md.nii.gz", md, Affine::identity());
    let diffusion = Diffusion::new((5, 5, 5, 8));
    let ctx = MaskContext::new(&diffusion, &loader);

    let fa_mask = SourceMask::thresholded_scalar(Scalar::DtiFa, Some(0.2), None, CombineOp::And);
    let md_mask = SourceMask::thresholded_scalar(Scalar::DtiMd, None, Some(0.002), CombineOp::And);
    let (fa_alone, fa_meta) = fa_mask.get_mask(&ctx, &row()).unwrap();
    let (md_alone, md_meta) = md_mask.get_mask(&ctx, &row()).unwrap();

    let children: Vec<Box<dyn Mask>> = vec![Box::new(fa_mask), Box::new(md_mask)];
    let mut combined = CombinedMask::new(children, CombineOp::And).unwrap();
    combined.find_path(&Dataset::default(), "01", "pre").unwrap();
    let (data, meta) = combined.get_mask(&ctx, &row()).unwrap();

    let expected = ndarray::Zip::from(bools(&fa_alone))
        .and(bools(&md_alone))
        .map_collect(|&a, &b| a && b);
    assert_eq!(bools(&data), &expected);
    assert!(expected.iter().any(|&v| v));
    assert!(!expected.iter().all(|&v| v));

    let MaskMeta::Combined {
        sources,
        combined_with,
    } = meta
    else {
        panic!("expected combined metadata");
    };
    assert_eq!(combined_with, CombineOp::And);
    assert_eq!(sources, vec![fa_meta, md_meta]);
}

#[test]
fn nested_combinations_fold_recursively() {
    let diffusion = Diffusion::new((2, 2, 1, 3));
    let loader = Loader::default();
    let ctx = MaskContext::new(&diffusion, &loader);

    let left = ndarray::arr3(&[[[true], [false]], [[false], [false]]]).into_dyn();
    let right = ndarray::arr3(&[[[false], [true]], [[false], [false]]]).into_dyn();
    let inner: Vec<Box<dyn Mask>> = vec![Box::new(FixedMask(left)), Box::new(FixedMask(right))];
    let outer: Vec<Box<dyn Mask>> = vec![
        Box::new(CombinedMask::new(inner, CombineOp::Or).unwrap()),
        Box::new(SourceMask::full()),
    ];
    let mask = CombinedMask::new(outer, CombineOp::And).unwrap();

    let (data, meta) = mask.get_mask(&ctx, &row()).unwrap();
    assert_eq!(
        bools(&data),
        &ndarray::arr3(&[[[true], [true]], [[false], [false]]]).into_dyn()
    );
    let json = meta.to_json().unwrap();
    assert_eq!(json["sources"][0]["combined_with"], "or");
    assert_eq!(json["sources"][0]["sources"].as_array().unwrap().len(), 2);
    assert_eq!(json["sources"][1]["source"], "Entire Volume");
}

#[test]
fn children_with_different_shapes_are_rejected() {
    let diffusion = Diffusion::new((3, 3, 3, 2));
    let loader = Loader::default();
    let ctx = MaskContext::new(&diffusion, &loader);

    let children: Vec<Box<dyn Mask>> = vec![
        Box::new(SourceMask::full()),
        Box::new(FixedMask(ArrayD::from_elem(IxDyn(&[2, 2, 2]), true))),
    ];
    let mask = CombinedMask::new(children, CombineOp::Or).unwrap();
    let err = mask.get_mask(&ctx, &row()).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("child 1 (fixed)"), "{err}");
}

#[test]
fn combined_find_path_stops_at_first_failure() {
    let dataset = Dataset::default().with("01", "pre", "aseg", &["aseg.nii.gz"]);
    let children: Vec<Box<dyn Mask>> = vec![
        Box::new(SourceMask::file("missing", None)),
        Box::new(SourceMask::file("aseg", None)),
    ];
    let mut mask = CombinedMask::new(children, CombineOp::And).unwrap();
    let err = mask.find_path(&dataset, "01", "pre").unwrap_err();
    assert!(err.is_lookup());
    assert!(err.to_string().contains("missing"));
}

#[test]
fn full_mask_covers_the_diffusion_volume() {
    let diffusion = Diffusion::new((3, 4, 5, 6));
    let loader = Loader::default();
    let ctx = MaskContext::new(&diffusion, &loader);

    let (data, meta) = SourceMask::full().get_mask(&ctx, &row()).unwrap();
    assert_eq!(data.shape(), &[3, 4, 5]);
    assert!(data.to_f64().iter().all(|&v| v == 1.0));
    assert_eq!(
        meta,
        MaskMeta::Source {
            source: "Entire Volume".into()
        }
    );
}

#[test]
fn mismatched_grids_are_resampled_once_keeping_dtype() {
    let dataset = Dataset::default().with("01", "pre", "aseg", &["aseg.nii.gz"]);
    let labels = MaskArray::Label(Array3::from_elem((10, 10, 10), 7i64).into_dyn());
    let loader = Loader::default().with("aseg.nii.gz", labels, Affine::scaling((2.0, 2.0, 2.0)));
    let diffusion = Diffusion::new((20, 20, 20, 30));
    let resampler = CountingResampler::default();
    let ctx = MaskContext::new(&diffusion, &loader).with_resampler(&resampler);

    let mut raw = SourceMask::file("aseg", None);
    raw.find_path(&dataset, "01", "pre").unwrap();
    let (data, _) = raw.get_mask(&ctx, &row()).unwrap();
    assert_eq!(resampler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(data.dtype(), DType::Label);
    assert_eq!(data.shape(), &[20, 20, 20]);

    let mut labelled = SourceMask::labelled_file("aseg", None, Some(vec![7]), None, CombineOp::Or);
    labelled.find_path(&dataset, "01", "pre").unwrap();
    let (data, _) = labelled.get_mask(&ctx, &row()).unwrap();
    assert_eq!(resampler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(data.dtype(), DType::Bool);
    assert_eq!(data.shape(), &[20, 20, 20]);
    assert!(bools(&data)[IxDyn(&[0, 0, 0])]);
}

#[test]
fn scalar_missing_from_context_is_a_configuration_error() {
    let mut diffusion = Diffusion::new((2, 2, 2, 2));
    diffusion.scalars = vec![Scalar::DtiFa, Scalar::DtiMd];
    let loader = Loader::default();
    let ctx = MaskContext::new(&diffusion, &loader);

    let err = SourceMask::scalar(Scalar::DkiFa)
        .get_mask(&ctx, &row())
        .unwrap_err();
    assert!(err.is_configuration());
    let msg = err.to_string();
    assert!(msg.contains("dki_fa") && msg.contains("dti_fa, dti_md"), "{msg}");
}

#[test]
fn settings_drive_the_whole_lifecycle() {
    let settings = MaskSettings::from_json_str(
        r#"{
            "brain_mask": {"kind": "labelled_file", "suffix": "aseg", "exclusive_labels": [0]},
            "stop_mask": {"kind": "thresholded_scalar", "scalar": "dti_fa", "upper_bound": 0.2}
        }"#,
    )
    .unwrap();
    let mut masks = settings.build().unwrap();

    let dataset = Dataset::default().with("01", "pre", "aseg", &["aseg.nii.gz"]);
    let loader = Loader::default()
        .with("aseg.nii.gz", aseg(), Affine::identity())
        .with(
            "sub-01_ses-pre_dti_fa.nii.gz",
            scalar_map((4, 4, 4), |_, _, k| k as f64 * 0.1),
            Affine::identity(),
        );
    let diffusion = Diffusion::new((4, 4, 4, 5));
    let ctx = MaskContext::new(&diffusion, &loader);

    masks.find_paths(&dataset, "01", "pre").unwrap();
    let (brain, _) = masks.brain_mask.get_mask(&ctx, &row()).unwrap();
    assert_eq!(bools(&brain).iter().filter(|&&v| v).count(), 48);

    let stop_mask = masks.stop_mask.as_ref().unwrap();
    let (stop, meta) = stop_mask.get_mask(&ctx, &row()).unwrap();
    assert_eq!(bools(&stop).iter().filter(|&&v| v).count(), 32);
    assert_eq!(meta.to_json().unwrap()["upper_bound"], 0.2);
}

#[test]
fn unresolved_brain_mask_in_settings_is_a_lookup_error() {
    let settings =
        MaskSettings::from_json_str(r#"{"brain_mask": {"kind": "file", "suffix": "brain"}}"#)
            .unwrap();
    let masks = settings.build().unwrap();
    let loader = Loader::default();
    let diffusion = Diffusion::new((2, 2, 2, 2));
    let ctx = MaskContext::new(&diffusion, &loader);
    assert!(masks.brain_mask.get_mask(&ctx, &row()).unwrap_err().is_lookup());
}
