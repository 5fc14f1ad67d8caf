/// Signature of a collective call's parameters, for the leader's agreement
/// check.
///
/// FNV-1a over each field preceded by its length, so moving bytes from one
/// field into the next changes the result. Never zero, so an untouched
/// signature word is distinguishable.
pub(crate) fn fnv1a_signature<I, S>(fields: I) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mix = |h: u64, b: u8| (h ^ b as u64).wrapping_mul(PRIME);
    let h = fields.into_iter().fold(OFFSET_BASIS, |h, field| {
        let field = field.as_ref();
        let h = (field.len() as u32).to_le_bytes().into_iter().fold(h, mix);
        field.iter().copied().fold(h, mix)
    });
    h.max(1)
}
