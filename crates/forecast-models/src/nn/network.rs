//! 다층 순환 신경망 회귀 모델.

use ndarray::{Array1, Array2, ArrayView2, ArrayView3, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::adam::{clip_grad_norm, Adam};
use super::{Dense, Parameter, RecurrentCell};
use crate::error::{ModelError, Result};
use crate::window::SequenceDataset;

/// 추론 시 한 번에 처리하는 샘플 수.
const INFERENCE_CHUNK: usize = 256;

/// 에폭 종료 시 보고되는 학습 통계.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct EpochStats {
    /// 1부터 시작하는 에폭 번호
    pub epoch: usize,
    pub epochs: usize,
    /// 정규화 공간의 학습 MSE
    pub train_loss: f64,
    /// 정규화 공간의 검증 MSE
    pub val_loss: Option<f64>,
}

/// 학습 하이퍼파라미터.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub clip_norm: f64,
    pub seed: Option<u64>,
}

/// 순환층을 쌓고 마지막 시점의 은닉 상태를 선형층으로 회귀하는 모델.
///
/// 층 사이 드롭아웃은 학습 중에만 적용됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentNetwork<C> {
    layers: Vec<C>,
    head: Dense,
    dropout: f64,
}

/// 한 배치의 순전파 결과.
struct ForwardPass<K> {
    caches: Vec<K>,
    masks: Vec<Option<Vec<Array2<f64>>>>,
    last_hidden: Array2<f64>,
    output: Array2<f64>,
}

impl<C: RecurrentCell> RecurrentNetwork<C> {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f64,
        rng: &mut StdRng,
    ) -> Result<Self> {
        if input_size == 0 || hidden_size == 0 || num_layers == 0 {
            return Err(ModelError::InvalidInput(
                "input size, hidden size and layer count must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(ModelError::InvalidInput(format!(
                "dropout must be in [0, 1), got {}",
                dropout
            )));
        }

        let mut layers = Vec::with_capacity(num_layers);
        layers.push(C::init(input_size, hidden_size, rng));
        for _ in 1..num_layers {
            layers.push(C::init(hidden_size, hidden_size, rng));
        }

        Ok(Self {
            layers,
            head: Dense::new(hidden_size, 1, rng),
            dropout,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn hidden_size(&self) -> usize {
        self.layers.first().map(|l| l.hidden_size()).unwrap_or(0)
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.input_size()).unwrap_or(0)
    }

    /// 학습 가능한 파라미터 수.
    pub fn num_parameters(&self) -> usize {
        self.params().iter().map(|p| p.value.len()).sum()
    }

    fn params(&self) -> Vec<&Parameter> {
        let mut params: Vec<&Parameter> = self.layers.iter().flat_map(|l| l.params()).collect();
        params.extend(self.head.params());
        params
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params: Vec<&mut Parameter> = self
            .layers
            .iter_mut()
            .flat_map(|l| l.params_mut())
            .collect();
        params.extend(self.head.params_mut());
        params
    }

    fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }

    fn check_input(&self, x: &ArrayView3<f64>) -> Result<()> {
        let (_, steps, features) = x.dim();
        if steps == 0 {
            return Err(ModelError::InvalidInput("input sequence is empty".into()));
        }
        if features != self.input_size() {
            return Err(ModelError::InvalidInput(format!(
                "expected {} input features, got {}",
                self.input_size(),
                features
            )));
        }
        Ok(())
    }

    /// `[B, T, I]` 입력을 시점별 `[B, I]` 배열로 나눕니다.
    fn time_major(x: &ArrayView3<f64>) -> Vec<Array2<f64>> {
        x.axis_iter(Axis(1)).map(|step| step.to_owned()).collect()
    }

    fn forward_pass(&self, x: &ArrayView3<f64>, rng: Option<&mut StdRng>) -> ForwardPass<C::Cache> {
        let mut seq = Self::time_major(x);
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut masks = Vec::with_capacity(self.layers.len());
        let keep = 1.0 - self.dropout;
        let mut rng = rng;

        for (index, layer) in self.layers.iter().enumerate() {
            let mask = match rng.as_deref_mut() {
                Some(rng) if index > 0 && self.dropout > 0.0 => {
                    let layer_masks: Vec<Array2<f64>> = seq
                        .iter()
                        .map(|step| {
                            Array2::random_using(step.raw_dim(), Uniform::new(0.0, 1.0), &mut *rng)
                                .mapv(|u: f64| if u < keep { 1.0 / keep } else { 0.0 })
                        })
                        .collect();
                    for (step, m) in seq.iter_mut().zip(&layer_masks) {
                        *step *= m;
                    }
                    Some(layer_masks)
                }
                _ => None,
            };

            let (outputs, cache) = layer.forward(&seq);
            caches.push(cache);
            masks.push(mask);
            seq = outputs;
        }

        // check_input에서 시점 수가 1 이상임을 보장
        let last_hidden = seq.pop().unwrap_or_else(|| Array2::zeros((x.dim().0, self.hidden_size())));
        let output = self.head.forward(&last_hidden);

        ForwardPass {
            caches,
            masks,
            last_hidden,
            output,
        }
    }

    /// 출력 그래디언트를 역전파하여 파라미터 그래디언트를 누적합니다.
    fn backward_pass(&mut self, pass: &ForwardPass<C::Cache>, d_output: &Array2<f64>, steps: usize) {
        let dh_last = self.head.backward(&pass.last_hidden, d_output);
        let hidden = self.hidden_size();
        let batch = d_output.nrows();

        let mut dhs = vec![Array2::<f64>::zeros((batch, hidden)); steps];
        if let Some(last) = dhs.last_mut() {
            *last = dh_last;
        }

        for index in (0..self.layers.len()).rev() {
            let mut dxs = self.layers[index].backward(&pass.caches[index], &dhs);
            if index == 0 {
                break;
            }
            if let Some(masks) = &pass.masks[index] {
                for (dx, m) in dxs.iter_mut().zip(masks) {
                    *dx *= m;
                }
            }
            dhs = dxs;
        }
    }

    /// 한 배치의 MSE를 계산하고 그래디언트를 누적합니다.
    pub(crate) fn accumulate_gradients(
        &mut self,
        x: &ArrayView3<f64>,
        y: &ArrayView2<f64>,
        rng: Option<&mut StdRng>,
    ) -> f64 {
        self.zero_grad();
        let pass = self.forward_pass(x, rng);
        let diff = &pass.output - y;
        let batch = diff.nrows().max(1) as f64;
        let loss = diff.iter().map(|d| d * d).sum::<f64>() / batch;
        let d_output = diff.mapv(|d| 2.0 * d / batch);
        self.backward_pass(&pass, &d_output, x.dim().1);
        loss
    }

    /// 배치 입력 `[B, T, I]`에 대한 예측값 `[B]`.
    pub fn predict(&self, x: &ArrayView3<f64>) -> Result<Array1<f64>> {
        self.check_input(x)?;
        let mut predictions = Vec::with_capacity(x.dim().0);
        for chunk in x.axis_chunks_iter(Axis(0), INFERENCE_CHUNK) {
            let pass = self.forward_pass(&chunk, None);
            predictions.extend(pass.output.column(0).iter().copied());
        }
        Ok(Array1::from(predictions))
    }

    /// 데이터셋 전체의 MSE.
    pub fn evaluate(&self, data: &SequenceDataset) -> Result<f64> {
        if data.is_empty() {
            return Err(ModelError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        let predictions = self.predict(&data.inputs.view())?;
        let mse = predictions
            .iter()
            .zip(data.targets.column(0))
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / data.len() as f64;
        Ok(mse)
    }

    /// 미니배치 Adam으로 학습합니다. 에폭마다 `on_epoch`가 호출됩니다.
    pub fn fit<F>(
        &mut self,
        train: &SequenceDataset,
        validation: Option<&SequenceDataset>,
        options: &FitOptions,
        mut on_epoch: F,
    ) -> Result<Vec<EpochStats>>
    where
        F: FnMut(&EpochStats),
    {
        if train.is_empty() {
            return Err(ModelError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        self.check_input(&train.inputs.view())?;
        if options.batch_size == 0 || options.epochs == 0 {
            return Err(ModelError::InvalidInput(
                "epochs and batch size must be positive".into(),
            ));
        }

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut optimizer = Adam::new(options.learning_rate);
        let mut indices: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::with_capacity(options.epochs);
        let validation = validation.filter(|v| !v.is_empty());

        info!(
            samples = train.len(),
            epochs = options.epochs,
            batch_size = options.batch_size,
            parameters = self.num_parameters(),
            "Training started"
        );

        for epoch in 1..=options.epochs {
            indices.shuffle(&mut rng);
            let mut loss_sum = 0.0;

            for batch in indices.chunks(options.batch_size) {
                let x = train.inputs.select(Axis(0), batch);
                let y = train.targets.select(Axis(0), batch);

                let loss = self.accumulate_gradients(&x.view(), &y.view(), Some(&mut rng));
                if !loss.is_finite() {
                    return Err(ModelError::Numerical(format!(
                        "training loss diverged at epoch {}",
                        epoch
                    )));
                }
                loss_sum += loss * batch.len() as f64;

                let mut params = self.params_mut();
                clip_grad_norm(&mut params, options.clip_norm);
                optimizer.step(params);
            }

            let train_loss = loss_sum / train.len() as f64;
            let val_loss = match validation {
                Some(v) => Some(self.evaluate(v)?),
                None => None,
            };
            let stats = EpochStats {
                epoch,
                epochs: options.epochs,
                train_loss,
                val_loss,
            };

            if epoch % 10 == 0 || epoch == options.epochs {
                info!(epoch, epochs = options.epochs, train_loss, ?val_loss, "Epoch completed");
            } else {
                debug!(epoch, train_loss, ?val_loss, "Epoch completed");
            }

            on_epoch(&stats);
            history.push(stats);
        }

        Ok(history)
    }
}
