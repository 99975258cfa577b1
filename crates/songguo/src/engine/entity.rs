/// Entity abstraction
///
/// All entities exposed to the engine implement the Entity trait.
pub trait Entity: Send + Sync {
    /// Engine-wide identifier, e.g. "switch.office_pc"
    fn entity_id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Identifier that stays stable across restarts
    fn unique_id(&self) -> &str;

    /// Return the platform type of this entity (e.g. "switch")
    fn platform(&self) -> &'static str;

    /// Whether the entity can currently be reached
    fn available(&self) -> bool {
        true
    }
}
