//! Azure Speech pronunciation assessment over the short-audio REST API.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use gradewise_core::error::ServiceError;
use gradewise_core::traits::{AssessedWord, PronunciationAssessment, PronunciationAssessor};

use crate::error::{check_status, http_client, normalize_base_url, require_key, transport_error};

pub const DEFAULT_REGION: &str = "eastus";
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const AUDIO_CONTENT_TYPE: &str = "audio/wav; codecs=audio/pcm; samplerate=16000";

pub struct AzureSpeechAssessor {
    api_key: String,
    endpoint: String,
    language: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl AzureSpeechAssessor {
    /// `base_url` overrides the regional endpoint derived from `region`.
    pub fn new(
        api_key: &str,
        region: &str,
        language: Option<String>,
        base_url: Option<String>,
        timeout_secs: Option<u64>,
    ) -> anyhow::Result<Self> {
        require_key(api_key, "speech")?;
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let base_url =
            base_url.unwrap_or_else(|| format!("https://{region}.stt.speech.microsoft.com"));
        Ok(Self {
            api_key: api_key.to_string(),
            endpoint: normalize_base_url(&base_url)?,
            language: language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            timeout_secs,
            client: http_client(timeout_secs)?,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/speech/recognition/conversation/cognitiveservices/v1?language={}&format=detailed",
            self.endpoint, self.language
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AssessmentParams<'a> {
    reference_text: &'a str,
    grading_system: &'static str,
    granularity: &'static str,
    dimension: &'static str,
}

/// Value for the `Pronunciation-Assessment` header.
fn assessment_header(reference_text: &str) -> Result<String, ServiceError> {
    let params = AssessmentParams {
        reference_text,
        grading_system: "HundredMark",
        granularity: "Word",
        dimension: "Comprehensive",
    };
    let json = serde_json::to_vec(&params)
        .map_err(|e| ServiceError::InvalidResponse(format!("assessment parameters: {e}")))?;
    Ok(B64.encode(json))
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default, rename = "NBest")]
    n_best: Vec<Candidate>,
}

/// Scores appear either inline or under a `PronunciationAssessment` object,
/// depending on the API version.
#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct Scores {
    accuracy_score: Option<f64>,
    fluency_score: Option<f64>,
    completeness_score: Option<f64>,
    pron_score: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Candidate {
    #[serde(flatten)]
    inline: Scores,
    #[serde(default)]
    pronunciation_assessment: Option<Scores>,
    #[serde(default)]
    words: Vec<RecognizedWord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognizedWord {
    word: String,
    accuracy_score: Option<f64>,
    error_type: Option<String>,
    #[serde(default)]
    pronunciation_assessment: Option<WordScores>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WordScores {
    accuracy_score: Option<f64>,
    error_type: Option<String>,
}

fn into_assessment(response: RecognitionResponse) -> Result<PronunciationAssessment, ServiceError> {
    if response.recognition_status != "Success" {
        return Err(ServiceError::InvalidResponse(format!(
            "speech not recognised: {}",
            response.recognition_status
        )));
    }
    let best = response
        .n_best
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::InvalidResponse("no recognition candidates".into()))?;

    let nested = best.pronunciation_assessment.unwrap_or_default();
    let pick = |nested: Option<f64>, inline: Option<f64>| nested.or(inline);
    let accuracy_score = pick(nested.accuracy_score, best.inline.accuracy_score);
    let fluency_score = pick(nested.fluency_score, best.inline.fluency_score);
    let completeness_score = pick(nested.completeness_score, best.inline.completeness_score);
    let overall_score = pick(nested.pron_score, best.inline.pron_score);

    let (Some(overall_score), Some(accuracy_score), Some(fluency_score), Some(completeness_score)) =
        (overall_score, accuracy_score, fluency_score, completeness_score)
    else {
        return Err(ServiceError::InvalidResponse(
            "recognition result carried no pronunciation scores".into(),
        ));
    };

    let words = best
        .words
        .into_iter()
        .map(|w| {
            let (accuracy, error_type) = match w.pronunciation_assessment {
                Some(scores) => (scores.accuracy_score, scores.error_type),
                None => (w.accuracy_score, w.error_type),
            };
            AssessedWord {
                word: w.word,
                accuracy_score: accuracy.unwrap_or(0.0),
                error_type,
            }
        })
        .collect();

    Ok(PronunciationAssessment {
        overall_score,
        accuracy_score,
        fluency_score,
        completeness_score,
        words,
    })
}

#[async_trait]
impl PronunciationAssessor for AzureSpeechAssessor {
    fn name(&self) -> &str {
        "azure-speech"
    }

    #[instrument(skip_all, fields(bytes = audio.len(), language = %self.language))]
    async fn assess(
        &self,
        audio: &[u8],
        reference_text: &str,
    ) -> Result<PronunciationAssessment, ServiceError> {
        let response = self
            .client
            .post(self.url())
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", AUDIO_CONTENT_TYPE)
            .header("Accept", "application/json")
            .header("Pronunciation-Assessment", assessment_header(reference_text)?)
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;
        let response = check_status(response).await?;

        let parsed: RecognitionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("recognition response: {e}")))?;
        into_assessment(parsed)
    }
}
