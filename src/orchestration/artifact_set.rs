//! ArtifactSet Builder - assembles the artifacts of one module
//!
//! Assembly is deterministic for a given module: outputs are validated,
//! hashed and returned in canonical classifier order (primary, sources, docs,
//! shaded). Nothing is written anywhere.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::error::ReleaseError;
use crate::core::hash::sha256_hex;
use crate::core::model::{
    Artifact, Classifier, ContentHandle, DeclaredOutput, Module, ModuleDescriptor, ModuleKind,
};
use crate::validation::ModuleValidator;

/// Depth searched below a module's output directory
const OUTPUT_SEARCH_DEPTH: usize = 3;

/// Assembled module plus non-fatal remarks
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub module: Module,
    pub warnings: Vec<String>,
}

/// Builds artifact sets from module descriptors
#[derive(Debug, Default)]
pub struct ArtifactSetBuilder {
    validator: ModuleValidator,
}

impl ArtifactSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository file name of a classifier's artifact
    ///
    /// ```
    /// use artifact_publisher::core::Classifier;
    /// use artifact_publisher::orchestration::ArtifactSetBuilder;
    ///
    /// assert_eq!(
    ///     ArtifactSetBuilder::file_name("core", "1.0.0", Classifier::Docs, "jar"),
    ///     "core-1.0.0-javadoc.jar"
    /// );
    /// ```
    pub fn file_name(name: &str, version: &str, classifier: Classifier, extension: &str) -> String {
        match classifier.file_suffix() {
            Some(suffix) => format!("{}-{}-{}.{}", name, version, suffix, extension),
            None => format!("{}-{}.{}", name, version, extension),
        }
    }

    /// Assemble the artifacts of a module
    ///
    /// Fails with `IncompleteModule` when the primary artifact is missing,
    /// a classifier is declared twice, or a declared file cannot be read.
    pub async fn build(&self, descriptor: &ModuleDescriptor) -> Result<ArtifactSet, ReleaseError> {
        let mut warnings = self.validator.validate(descriptor)?;

        let mut outputs = Self::declared_outputs(descriptor)?;
        if let Some(dir) = &descriptor.output_dir {
            Self::discover_outputs(descriptor, dir, &mut outputs);
        }

        if descriptor.kind == ModuleKind::Bom {
            let ignored: Vec<Classifier> = outputs
                .keys()
                .copied()
                .filter(|c| *c != Classifier::Primary)
                .collect();
            for classifier in ignored {
                outputs.remove(&classifier);
                warnings.push(format!("bom module ignores its {} artifact", classifier));
            }
        }

        if !outputs.contains_key(&Classifier::Primary) {
            return Err(ReleaseError::IncompleteModule {
                module: descriptor.name.clone(),
                reason: "primary artifact is missing".to_string(),
            });
        }

        if descriptor.kind == ModuleKind::Library {
            for classifier in [Classifier::Sources, Classifier::Docs] {
                if !outputs.contains_key(&classifier) {
                    warnings.push(format!("no {} artifact", classifier));
                }
            }
        }

        // BTreeMap iteration follows the canonical classifier order
        let mut artifacts = Vec::with_capacity(outputs.len());
        for (classifier, output) in outputs {
            artifacts.push(Self::assemble(descriptor, classifier, output).await?);
        }

        for warning in &warnings {
            tracing::warn!(module = %descriptor.name, "{}", warning);
        }
        tracing::debug!(
            module = %descriptor.name,
            artifacts = artifacts.len(),
            "artifact set assembled"
        );

        Ok(ArtifactSet {
            module: Module {
                name: descriptor.name.clone(),
                version: descriptor.version.clone(),
                group: descriptor.group.clone(),
                kind: descriptor.kind,
                artifacts,
            },
            warnings,
        })
    }

    fn declared_outputs(
        descriptor: &ModuleDescriptor,
    ) -> Result<BTreeMap<Classifier, DeclaredOutput>, ReleaseError> {
        let mut outputs = BTreeMap::new();
        for output in &descriptor.outputs {
            if outputs.insert(output.classifier, output.clone()).is_some() {
                return Err(ReleaseError::IncompleteModule {
                    module: descriptor.name.clone(),
                    reason: format!("{} artifact declared more than once", output.classifier),
                });
            }
        }
        Ok(outputs)
    }

    /// Fill classifiers that were not declared explicitly from the output directory
    fn discover_outputs(
        descriptor: &ModuleDescriptor,
        dir: &Path,
        outputs: &mut BTreeMap<Classifier, DeclaredOutput>,
    ) {
        let found: HashMap<String, PathBuf> = WalkDir::new(dir)
            .max_depth(OUTPUT_SEARCH_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .fold(HashMap::new(), |mut found, entry| {
                found
                    .entry(entry.file_name().to_string_lossy().into_owned())
                    .or_insert_with(|| entry.path().to_path_buf());
                found
            });

        for classifier in Classifier::ALL {
            if outputs.contains_key(&classifier) {
                continue;
            }
            let expected = Self::file_name(
                &descriptor.name,
                &descriptor.version,
                classifier,
                &descriptor.extension,
            );
            if let Some(path) = found.get(&expected) {
                tracing::debug!(module = %descriptor.name, %classifier, path = %path.display(), "discovered output");
                outputs.insert(
                    classifier,
                    DeclaredOutput {
                        classifier,
                        content: ContentHandle::File(path.clone()),
                        extension: None,
                    },
                );
            }
        }
    }

    async fn assemble(
        descriptor: &ModuleDescriptor,
        classifier: Classifier,
        output: DeclaredOutput,
    ) -> Result<Artifact, ReleaseError> {
        let bytes = output.content.read().await.map_err(|e| match e {
            ReleaseError::Io { path, source } if source.kind() == ErrorKind::NotFound => {
                ReleaseError::IncompleteModule {
                    module: descriptor.name.clone(),
                    reason: format!("{} artifact not found at {}", classifier, path),
                }
            }
            other => other,
        })?;

        let extension = output
            .extension
            .unwrap_or_else(|| descriptor.extension.clone());

        Ok(Artifact {
            classifier,
            file_name: Self::file_name(&descriptor.name, &descriptor.version, classifier, &extension),
            extension,
            content: output.content,
            content_hash: sha256_hex(&bytes),
            size: bytes.len() as u64,
        })
    }
}
