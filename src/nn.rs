//! Neural Network inference.

use std::{path::Path, sync::Arc};

use anyhow::{bail, Context};
use image::RgbImage;
use tract_onnx::prelude::{
    tract_ndarray::Array4, tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec,
    Tensor, TypedFact, TypedOp,
};

use crate::image::Resolution;

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the loaded model.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    inner: Model,
    name: String,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!(
                "neural network path '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read model from '{}'", path.display()))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_onnx(&model_data, name)
            .with_context(|| format!("failed to load model '{}'", path.display()))
    }

    /// Loads a pre-trained model from an in-memory ONNX file.
    pub fn from_onnx(raw: &[u8], name: impl Into<String>) -> anyhow::Result<Self> {
        let name = name.into();
        let graph = tract_onnx::onnx().model_for_read(&mut &*raw)?;
        let model = graph.into_optimized()?.into_runnable()?;
        log::debug!(
            "loaded network '{}' ({} inputs, {} outputs)",
            name,
            model.model().inputs.len(),
            model.model().outputs.len(),
        );
        Ok(Self(Arc::new(NeuralNetworkImpl { inner: model, name })))
    }

    /// Returns the name the network was loaded with (the model file stem).
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.inner.model().inputs.len()
    }

    /// Returns the tensor shape expected for input `index`.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<TVec<usize>> {
        let fact = self.0.inner.model().input_fact(index)?;
        match fact.shape.as_concrete() {
            Some(shape) => Ok(shape.into()),
            None => bail!(
                "network '{}' has symbolic shape for input {}",
                self.0.name,
                index
            ),
        }
    }

    /// Runs the network on a set of inputs, returning the estimated outputs.
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: TVec<Tensor>) -> anyhow::Result<Outputs> {
        let outputs = self.0.inner.run(
            inputs
                .into_iter()
                .map(|t| TValue::from_const(Arc::new(t)))
                .collect(),
        )?;
        Ok(Outputs { inner: outputs })
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, fixed at 1.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CnnInputShape {
    /// Shape is `(N, C, H, W)`.
    NCHW,
    /// Shape is `(N, H, W, C)`.
    NHWC,
}

impl CnnInputShape {
    /// Determines the layout and input resolution from a tensor shape.
    ///
    /// Returns [`None`] if the shape is not a single 3-channel image in either layout.
    pub fn detect(shape: &[usize]) -> Option<(Self, Resolution)> {
        let (layout, w, h) = match *shape {
            [1, 3, h, w] => (Self::NCHW, w, h),
            [1, h, w, 3] => (Self::NHWC, w, h),
            _ => return None,
        };
        let res = Resolution::new(w.try_into().ok()?, h.try_into().ok()?);
        if res.is_empty() {
            return None;
        }
        Some((layout, res))
    }
}

/// A convolutional neural network (CNN) that operates on image data.
///
/// The input layout and resolution are read from the network. Color values are mapped linearly
/// from `0..=255` to `0.0..=1.0`.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    shape: CnnInputShape,
    input_res: Resolution,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input, shaped like an NCHW or NHWC RGB image.
    pub fn new(nn: NeuralNetwork) -> anyhow::Result<Self> {
        if nn.num_inputs() != 1 {
            bail!(
                "CNN '{}' has to take 1 input, this one takes {}",
                nn.name(),
                nn.num_inputs()
            );
        }

        let tensor_shape = nn.input_shape(0)?;
        let (shape, input_res) = match CnnInputShape::detect(&tensor_shape) {
            Some(detected) => detected,
            None => bail!(
                "invalid input shape for CNN '{}': {:?}",
                nn.name(),
                tensor_shape
            ),
        };
        log::debug!(
            "CNN '{}' takes {} {:?} input",
            nn.name(),
            input_res,
            shape
        );

        Ok(Self {
            nn,
            shape,
            input_res,
        })
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    #[inline]
    pub fn network(&self) -> &NeuralNetwork {
        &self.nn
    }

    /// Runs the network on an input image, returning the estimated outputs.
    ///
    /// The image's resolution must match the CNN's [`input_resolution`][Self::input_resolution].
    pub fn estimate(&self, image: &RgbImage) -> anyhow::Result<Outputs> {
        let res = Resolution::new(image.width(), image.height());
        if res != self.input_res {
            bail!(
                "CNN '{}' expects {} input, got {}",
                self.nn.name(),
                self.input_res,
                res
            );
        }

        let tensor = image_to_tensor(image, self.shape);
        self.nn.estimate(tvec![tensor])
    }
}

/// Converts an RGB image into a 4D input tensor.
fn image_to_tensor(image: &RgbImage, shape: CnnInputShape) -> Tensor {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let map = |value: u8| value as f32 / 255.0;

    let array = match shape {
        CnnInputShape::NCHW => Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
            map(image.get_pixel(x as u32, y as u32)[c])
        }),
        CnnInputShape::NHWC => Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
            map(image.get_pixel(x as u32, y as u32)[c])
        }),
    };
    array.into()
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<TValue>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the shape of output `index`.
    pub fn shape(&self, index: usize) -> anyhow::Result<&[usize]> {
        Ok(self.tensor(index)?.shape())
    }

    /// Returns the data of output `index` as a flat `f32` slice.
    pub fn as_slice(&self, index: usize) -> anyhow::Result<&[f32]> {
        self.tensor(index)?.as_slice::<f32>()
    }

    fn tensor(&self, index: usize) -> anyhow::Result<&Tensor> {
        match self.inner.get(index) {
            Some(value) => Ok(&**value),
            None => bail!(
                "network output {} requested, but there are only {}",
                index,
                self.inner.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn detects_input_layout() {
        assert_eq!(
            CnnInputShape::detect(&[1, 3, 192, 192]),
            Some((CnnInputShape::NCHW, Resolution::new(192, 192)))
        );
        assert_eq!(
            CnnInputShape::detect(&[1, 224, 256, 3]),
            Some((CnnInputShape::NHWC, Resolution::new(256, 224)))
        );
        assert_eq!(CnnInputShape::detect(&[1, 4, 192, 192]), None);
        assert_eq!(CnnInputShape::detect(&[2, 3, 192, 192]), None);
        assert_eq!(CnnInputShape::detect(&[1, 3, 0, 192]), None);
        assert_eq!(CnnInputShape::detect(&[1, 63]), None);
    }

    #[test]
    fn nchw_tensor() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, Rgb([255, 0, 51]));
        let tensor = image_to_tensor(&image, CnnInputShape::NCHW);
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert_eq!(tensor.as_slice::<f32>().unwrap(), &[0.0, 1.0, 0.0, 0.0, 0.0, 0.2]);
    }

    #[test]
    fn nhwc_tensor() {
        let mut image = RgbImage::new(1, 2);
        image.put_pixel(0, 1, Rgb([255, 0, 255]));
        let tensor = image_to_tensor(&image, CnnInputShape::NHWC);
        assert_eq!(tensor.shape(), &[1, 2, 1, 3]);
        assert_eq!(
            tensor.as_slice::<f32>().unwrap(),
            &[0.0, 0.0, 0.0, 1.0, 0.0, 1.0]
        );
    }

    #[test]
    fn load_requires_onnx_extension() {
        let err = NeuralNetwork::load("models/palm_detection.tflite")
            .err()
            .unwrap();
        assert!(err.to_string().contains("`.onnx` extension"), "{err}");
    }

    #[test]
    fn load_missing_file() {
        let err = NeuralNetwork::load("/nonexistent/hand_landmark_full.onnx")
            .err()
            .unwrap();
        assert!(err.to_string().contains("failed to read model"), "{err}");
    }
}
