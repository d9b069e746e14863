use scenebuild_core::id::NodeId;
use scenebuild_core::processor::{
    FragmentProcessor, ProcessorContext, ProcessorError, ProcessorSpec,
};
use tracing::{debug, info};

/// Name of the output node created when no template is configured.
pub const TAGGED_OUTPUT_NAME: &str = "Tagged objects";

/// Moves every node below the fragment root whose tag is one of `tags`
/// under a single output node: an instance of `template` when one is
/// configured, otherwise a new child of the root named
/// [`TAGGED_OUTPUT_NAME`]. Inactive nodes are included.
///
/// Params: `tags` (list or single text), `template` (asset path, optional).
#[derive(Debug, Clone, Default)]
pub struct ExtractTagged {
    pub tags: Vec<String>,
    pub template: Option<String>,
}

impl ExtractTagged {
    pub fn from_spec(spec: &ProcessorSpec) -> Result<Self, ProcessorError> {
        Ok(Self {
            tags: spec.list("tags")?,
            template: spec.text("template")?.map(str::to_string),
        })
    }
}

impl FragmentProcessor for ExtractTagged {
    fn name(&self) -> &str {
        crate::EXTRACT_TAGGED
    }

    fn on_build_scene(
        &mut self,
        ctx: &mut ProcessorContext<'_>,
        root: NodeId,
    ) -> Result<(), ProcessorError> {
        let world = &*ctx.world;
        let tagged: Vec<NodeId> = world
            .descendants(root, true)
            .into_iter()
            .filter(|&id| id != root)
            .filter(|&id| {
                world
                    .node(id)
                    .and_then(|n| n.tag.as_deref())
                    .is_some_and(|tag| self.tags.iter().any(|t| t == tag))
            })
            .collect();

        let output = match &self.template {
            Some(path) => ctx.instantiate_template(path, root)?,
            None => ctx.world.create_child(root, TAGGED_OUTPUT_NAME)?,
        };
        debug!(?output, template = ?self.template, "tagged output node");

        for &node in &tagged {
            ctx.world.reparent(node, Some(output))?;
        }
        info!(moved = tagged.len(), tags = ?self.tags, "extracted tagged objects");
        Ok(())
    }
}
