use super::phantom::{inspect, locate_plan};
use crate::core::plan::codec::PlanCodec;
use crate::engine::config::{PatientDefaults, SessionConfig};
use crate::engine::editor::{BeamReplacement, EditReport, GeometryEdit, PlanDocumentEditor};
use crate::engine::error::WorkflowError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::tools::{CommandExecutor, ToolError, find_plan_file};
use crate::engine::transfer::is_portable_name;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Characters drawn for the patient id suffix.
pub const ID_ALPHABET: &[u8] = b"1234567890ABCDEF";
pub const ID_SUFFIX_LEN: usize = 3;

/// Patient attributes stamped onto the cloned dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientIdentity {
    /// `last^first`.
    pub name: String,
    /// `first_XXX`; three random hexadecimal characters, not checked for uniqueness.
    pub id: String,
    pub birth_date: String,
    pub sex: String,
}

impl PatientIdentity {
    pub fn generate<R: Rng + ?Sized>(
        first_name: &str,
        last_name: &str,
        defaults: &PatientDefaults,
        rng: &mut R,
    ) -> Self {
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self {
            name: format!("{}^{}", last_name, first_name),
            id: format!("{}_{}", first_name, suffix),
            birth_date: defaults.birth_date.clone(),
            sex: defaults.sex.clone(),
        }
    }

    /// The attribute override list understood by the dataset cloner.
    pub fn attribute_overrides(&self) -> String {
        format!(
            "PatientName : {}, PatientID : {}, PatientBirthDate : {}, PatientSex : {}",
            self.name, self.id, self.birth_date, self.sex
        )
    }
}

pub fn session_name(first_name: &str, last_name: &str) -> String {
    format!("{}_{}", first_name, last_name)
}

/// Session names end up in local paths, remote shell commands and FTP
/// paths, so each part is limited to portable characters.
fn validate_name(value: &str, what: &str) -> Result<(), WorkflowError> {
    if !is_portable_name(value) {
        return Err(WorkflowError::InvalidArgument(format!(
            "{} '{}' cannot be used in a session name; use ASCII letters, digits, '_' or '-'",
            what, value
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRequest {
    pub phantom_dir: PathBuf,
    pub first_name: String,
    pub last_name: String,
    /// Spot map to generate fresh beams from; the phantom's beams are kept when absent.
    pub spot_map: Option<PathBuf>,
    /// Turn the first generated beam into a setup beam.
    pub setup_beam: bool,
    pub position: [Option<f64>; 3],
    pub gantry_angle: Option<f64>,
}

impl SessionRequest {
    fn has_user_geometry(&self) -> bool {
        self.position.iter().any(Option::is_some) || self.gantry_angle.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionHandle {
    pub name: String,
    pub directory: PathBuf,
    pub patient: PatientIdentity,
    pub plan_path: PathBuf,
    pub edit: EditReport,
}

/// Creates QA sessions by cloning a phantom and rewriting its plan.
pub struct SessionCloner<'a, E, C> {
    config: &'a SessionConfig,
    executor: E,
    editor: PlanDocumentEditor<C>,
}

impl<'a, E: CommandExecutor, C: PlanCodec> SessionCloner<'a, E, C> {
    pub fn new(config: &'a SessionConfig, executor: E, codec: C) -> Self {
        Self {
            config,
            executor,
            editor: PlanDocumentEditor::new(codec),
        }
    }

    /// Runs the session workflow.
    ///
    /// Beam generation and phantom inspection happen before anything is
    /// written, so their failures leave no session directory behind. A failure
    /// after cloning leaves the partially built directory in place.
    #[instrument(skip_all, name = "session_workflow", fields(first = %request.first_name, last = %request.last_name))]
    pub fn create_session<R: Rng + ?Sized>(
        &self,
        request: &SessionRequest,
        rng: &mut R,
        reporter: &ProgressReporter,
    ) -> Result<SessionHandle, WorkflowError> {
        validate_name(&request.first_name, "First name")?;
        validate_name(&request.last_name, "Last name")?;

        let name = session_name(&request.first_name, &request.last_name);
        let directory = self.config.output_root.join(&name);
        if directory.exists() {
            return Err(WorkflowError::SessionExists { path: directory });
        }
        let patient = PatientIdentity::generate(
            &request.first_name,
            &request.last_name,
            &self.config.patient,
            rng,
        );

        let replacement = match &request.spot_map {
            Some(spot_map) => Some(reporter.phase("Generating plan", || {
                self.generate_beams(spot_map, request.setup_beam)
            })?),
            None => None,
        };

        let mut edit = GeometryEdit {
            position: request.position,
            gantry_angle: request.gantry_angle,
            replacement,
        };
        if !request.has_user_geometry() {
            let phantom = reporter.phase("Reading phantom", || {
                inspect(&request.phantom_dir, &self.config.plan_marker, self.editor.codec())
            })?;
            info!(
                "No geometry given; keeping phantom isocenter {:?}.",
                phantom.isocenter
            );
            edit.position = [
                Some(phantom.isocenter.x),
                Some(phantom.isocenter.y),
                Some(phantom.isocenter.z),
            ];
        }

        reporter.phase("Cloning phantom", || {
            self.clone_phantom(&request.phantom_dir, &directory, &patient)
        })?;

        let plan_path = locate_plan(&directory, &self.config.plan_marker)?;
        let edit_report = reporter
            .phase("Editing plan", || self.editor.edit_file(&plan_path, &edit))
            .inspect_err(|_| {
                warn!(
                    "Session '{}' was cloned but its plan could not be edited.",
                    directory.display()
                )
            })?;

        reporter.report(Progress::Message(format!(
            "Data saved to directory: {}",
            directory.display()
        )));
        info!("Created session '{}' for patient {}.", name, patient.id);

        Ok(SessionHandle {
            name,
            directory,
            patient,
            plan_path,
            edit: edit_report,
        })
    }

    /// Runs the plan generator on a copy of `spot_map` in a scratch directory
    /// and extracts the beam and fraction-group sequences it produced.
    fn generate_beams(
        &self,
        spot_map: &Path,
        setup_beam: bool,
    ) -> Result<BeamReplacement, WorkflowError> {
        let scratch = tempfile::tempdir().map_err(WorkflowError::io(&std::env::temp_dir()))?;
        let file_name = spot_map.file_name().ok_or_else(|| {
            WorkflowError::InvalidArgument(format!(
                "Spot map path '{}' has no file name",
                spot_map.display()
            ))
        })?;
        let input = scratch.path().join(file_name);
        fs::copy(spot_map, &input).map_err(WorkflowError::io(spot_map))?;

        let invocation = self
            .config
            .tools
            .plan_generator
            .render(&[("input", &*input.to_string_lossy())])
            .current_dir(scratch.path());
        self.executor.run(&invocation)?;

        let marker = &self.config.plan_marker;
        let generated = find_plan_file(scratch.path(), marker)
            .map_err(WorkflowError::io(scratch.path()))?
            .ok_or_else(|| ToolError::MissingOutput {
                program: invocation.program.clone(),
                expected: format!("a plan file containing '{}'", marker),
                dir: scratch.path().to_path_buf(),
            })?;

        let document = self.editor.codec().read(&generated)?;
        let mut replacement = BeamReplacement::from_document(&document)?;
        if setup_beam {
            replacement.mark_setup_beam()?;
        }
        info!(
            "Generated {} beams from '{}'.",
            replacement.beams.len(),
            spot_map.display()
        );
        Ok(replacement)
    }

    fn clone_phantom(
        &self,
        phantom_dir: &Path,
        directory: &Path,
        patient: &PatientIdentity,
    ) -> Result<(), WorkflowError> {
        if let Some(parent) = directory.parent() {
            fs::create_dir_all(parent).map_err(WorkflowError::io(parent))?;
        }
        fs::create_dir(directory).map_err(|source| match source.kind() {
            std::io::ErrorKind::AlreadyExists => WorkflowError::SessionExists {
                path: directory.to_path_buf(),
            },
            _ => WorkflowError::Io {
                path: directory.to_path_buf(),
                source,
            },
        })?;

        let attributes = patient.attribute_overrides();
        let invocation = self.config.tools.dataset_cloner.render(&[
            ("input", &*phantom_dir.to_string_lossy()),
            ("output", &*directory.to_string_lossy()),
            ("attributes", attributes.as_str()),
        ]);
        self.executor.run(&invocation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::document::PlanDocument;
    use crate::core::plan::document::fixtures::*;
    use crate::core::plan::json::DicomJsonCodec;
    use crate::core::plan::tags;
    use crate::engine::config::{CommandTemplate, SessionConfigBuilder, ToolsConfig};
    use crate::engine::tools::{Invocation, ToolOutput};
    use nalgebra::Point3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::RefCell;
    use tempfile::{TempDir, tempdir};

    /// Stands in for the generator and cloner binaries.
    struct FakeTools {
        calls: RefCell<Vec<Invocation>>,
        generated: Option<PlanDocument>,
    }

    impl FakeTools {
        fn new(generated: Option<PlanDocument>) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                generated,
            }
        }
    }

    impl CommandExecutor for FakeTools {
        fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
            self.calls.borrow_mut().push(invocation.clone());
            match invocation.program.as_str() {
                "generate" => {
                    let dir = invocation.working_dir.clone().unwrap();
                    fs::write(dir.join("spots.xml"), b"<xml/>").unwrap();
                    if let Some(plan) = &self.generated {
                        DicomJsonCodec.write(&dir.join("spots_RTIP.json"), plan).unwrap();
                    }
                }
                "clone" => {
                    let (from, to) = (&invocation.args[0], &invocation.args[1]);
                    for entry in fs::read_dir(from).unwrap() {
                        let path = entry.unwrap().path();
                        fs::copy(&path, Path::new(to).join(path.file_name().unwrap())).unwrap();
                    }
                }
                other => panic!("unexpected program {}", other),
            }
            Ok(ToolOutput::default())
        }
    }

    struct Fixture {
        _root: TempDir,
        phantom: PathBuf,
        spot_map: PathBuf,
        config: SessionConfig,
    }

    fn fixture() -> Fixture {
        let root = tempdir().unwrap();
        let phantom = root.path().join("phantom");
        fs::create_dir(&phantom).unwrap();
        fs::write(phantom.join("CT.1.dcm"), b"ct").unwrap();
        DicomJsonCodec
            .write(&phantom.join("phantom_RTIP.json"), &phantom_plan())
            .unwrap();
        let spot_map = root.path().join("spots.csv");
        fs::write(&spot_map, "1,100,0,0,0,0,1,0,0\n").unwrap();

        let tools = ToolsConfig {
            plan_generator: CommandTemplate::new("generate", ["{input}"]),
            dataset_cloner: CommandTemplate::new("clone", ["{input}", "{output}", "{attributes}"]),
            ..ToolsConfig::default()
        };
        let config = SessionConfigBuilder::new()
            .output_root(root.path().join("sessions"))
            .tools(tools)
            .build()
            .unwrap();
        Fixture {
            _root: root,
            phantom,
            spot_map,
            config,
        }
    }

    fn request(fixture: &Fixture) -> SessionRequest {
        SessionRequest {
            phantom_dir: fixture.phantom.clone(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            ..Default::default()
        }
    }

    fn generated_plan() -> PlanDocument {
        let mut plan = PlanDocument::default();
        plan.dataset_mut()
            .put_items(tags::FRACTION_GROUP_SEQUENCE, vec![fraction_group("4", 1)]);
        plan.dataset_mut().put_items(
            tags::ION_BEAM_SEQUENCE,
            vec![beam("1", vec![control_point("160", ["0", "0", "0"], "0")])],
        );
        plan
    }

    #[test]
    fn patient_identity_follows_naming_convention() {
        let mut rng = StdRng::seed_from_u64(7);
        let identity =
            PatientIdentity::generate("Jane", "Doe", &PatientDefaults::default(), &mut rng);

        assert_eq!(identity.name, "Doe^Jane");
        let suffix = identity.id.strip_prefix("Jane_").unwrap();
        assert_eq!(suffix.len(), 3);
        assert!(suffix.bytes().all(|b| ID_ALPHABET.contains(&b)));
        assert_eq!(
            identity.attribute_overrides(),
            format!(
                "PatientName : Doe^Jane, PatientID : {}, PatientBirthDate : 19830104, PatientSex : F",
                identity.id
            )
        );
    }

    #[test]
    fn session_without_geometry_keeps_phantom_isocenter() {
        let fixture = fixture();
        let tools = FakeTools::new(None);
        let cloner = SessionCloner::new(&fixture.config, &tools, DicomJsonCodec);

        let handle = cloner
            .create_session(&request(&fixture), &mut StdRng::seed_from_u64(1), &ProgressReporter::new())
            .unwrap();

        assert_eq!(handle.name, "Jane_Doe");
        assert_eq!(handle.directory, fixture.config.output_root.join("Jane_Doe"));
        assert!(handle.directory.join("CT.1.dcm").is_file());
        assert!(handle.edit.isocenter_applied);
        assert!(!handle.edit.gantry_applied);

        let plan = DicomJsonCodec.read(&handle.plan_path).unwrap();
        assert_eq!(plan.isocenter().unwrap(), Point3::new(10.0, 20.0, 30.0));
        assert_eq!(plan.dataset().string(tags::RT_PLAN_GEOMETRY), Some("PATIENT"));

        let calls = tools.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args[2], handle.patient.attribute_overrides());
    }

    #[test]
    fn user_geometry_is_written_to_the_cloned_plan() {
        let fixture = fixture();
        let tools = FakeTools::new(None);
        let cloner = SessionCloner::new(&fixture.config, &tools, DicomJsonCodec);
        let request = SessionRequest {
            position: [Some(1.0), Some(2.0), Some(3.0)],
            gantry_angle: Some(90.0),
            ..request(&fixture)
        };

        let handle = cloner
            .create_session(&request, &mut StdRng::seed_from_u64(2), &ProgressReporter::new())
            .unwrap();

        let plan = DicomJsonCodec.read(&handle.plan_path).unwrap();
        assert_eq!(plan.isocenter().unwrap(), Point3::new(1.0, 2.0, 3.0));
        assert_eq!(plan.gantry_angle().unwrap(), Some(90.0));
        // The phantom itself is never modified.
        let phantom = DicomJsonCodec
            .read(&fixture.phantom.join("phantom_RTIP.json"))
            .unwrap();
        assert_eq!(phantom, phantom_plan());
    }

    #[test]
    fn spot_map_beams_are_generated_and_spliced_with_setup_override() {
        let fixture = fixture();
        let tools = FakeTools::new(Some(generated_plan()));
        let cloner = SessionCloner::new(&fixture.config, &tools, DicomJsonCodec);
        let request = SessionRequest {
            spot_map: Some(fixture.spot_map.clone()),
            setup_beam: true,
            ..request(&fixture)
        };

        let handle = cloner
            .create_session(&request, &mut StdRng::seed_from_u64(3), &ProgressReporter::new())
            .unwrap();

        assert!(handle.edit.sequences_replaced);
        let plan = DicomJsonCodec.read(&handle.plan_path).unwrap();
        let beams = plan.beams().unwrap();
        assert_eq!(beams.len(), 1);
        assert_eq!(beams[0].string(tags::TREATMENT_DELIVERY_TYPE), Some("SETUP"));
        assert_eq!(
            plan.fraction_groups().unwrap()[0].string(tags::FRACTION_GROUP_NUMBER),
            Some("1")
        );

        let calls = tools.calls.borrow();
        assert_eq!(calls[0].program, "generate");
        assert!(calls[0].args[0].ends_with("spots.csv"));
        assert_ne!(calls[0].working_dir.as_deref(), fixture.spot_map.parent());
        assert!(!calls[0].working_dir.as_ref().unwrap().exists());
    }

    #[test]
    fn generator_without_plan_output_fails_before_cloning() {
        let fixture = fixture();
        let tools = FakeTools::new(None);
        let cloner = SessionCloner::new(&fixture.config, &tools, DicomJsonCodec);
        let request = SessionRequest {
            spot_map: Some(fixture.spot_map.clone()),
            ..request(&fixture)
        };

        let result =
            cloner.create_session(&request, &mut StdRng::seed_from_u64(4), &ProgressReporter::new());

        assert!(matches!(
            result,
            Err(WorkflowError::Tool {
                source: ToolError::MissingOutput { .. }
            })
        ));
        assert!(!fixture.config.output_root.join("Jane_Doe").exists());
    }

    #[test]
    fn existing_session_directory_is_refused() {
        let fixture = fixture();
        fs::create_dir_all(fixture.config.output_root.join("Jane_Doe")).unwrap();
        let tools = FakeTools::new(None);
        let cloner = SessionCloner::new(&fixture.config, &tools, DicomJsonCodec);

        let result = cloner.create_session(
            &request(&fixture),
            &mut StdRng::seed_from_u64(5),
            &ProgressReporter::new(),
        );

        assert!(matches!(result, Err(WorkflowError::SessionExists { .. })));
        assert!(tools.calls.borrow().is_empty());
    }

    #[test]
    fn names_with_path_or_shell_syntax_are_rejected() {
        let fixture = fixture();
        let tools = FakeTools::new(None);
        let cloner = SessionCloner::new(&fixture.config, &tools, DicomJsonCodec);
        for (first, last) in [
            ("../x", "Doe"),
            ("Mary Ann", "Doe"),
            ("Jane", "x;touch pwned"),
            ("$(id)", "Doe"),
            ("-rf", "Doe"),
            ("", "Doe"),
        ] {
            let request = SessionRequest {
                first_name: first.into(),
                last_name: last.into(),
                ..request(&fixture)
            };
            let result = cloner.create_session(
                &request,
                &mut StdRng::seed_from_u64(6),
                &ProgressReporter::new(),
            );
            assert!(
                matches!(result, Err(WorkflowError::InvalidArgument(_))),
                "{} {} was accepted",
                first,
                last
            );
        }
        assert!(tools.calls.borrow().is_empty());
        assert!(!fixture.config.output_root.join("Mary Ann_Doe").exists());
    }
}
