//! Overload matching against the builtin signature table.

use esslt_lang_hir::intrinsics::{self, Intrinsic, ParamType, ReturnType};
use esslt_lang_hir::{ScalarType, TypeLayout};
use esslt_shared::{ShaderStage, ShaderVersion};

pub struct IntrinsicMatch {
    pub intrinsic: Intrinsic,
    pub return_layout: TypeLayout,
    /// Per-argument target layout where an implicit conversion is needed
    pub conversions: Vec<Option<TypeLayout>>,
    /// Argument positions bound to `out` parameters
    pub out_args: Vec<usize>,
}

fn dim(layout: &TypeLayout) -> Option<u32> {
    match *layout {
        TypeLayout::Scalar(_) => Some(1),
        TypeLayout::Vector(_, n) => Some(n),
        _ => None,
    }
}

fn unify<T: PartialEq + Clone>(slot: &mut Option<T>, value: T) -> bool {
    match slot {
        Some(existing) => *existing == value,
        None => {
            *slot = Some(value);
            true
        }
    }
}

/// Tries one signature. On a lenient match, `conversions` marks the
/// arguments that need an int-to-float wrap.
fn match_signature(
    params: &[ParamType],
    returns: ReturnType,
    intrinsic: Intrinsic,
    args: &[TypeLayout],
    allow_conversion: bool,
) -> Option<IntrinsicMatch> {
    if params.len() != args.len() {
        return None;
    }
    let mut gen: Option<TypeLayout> = None;
    let mut vec_size: Option<u32> = None;
    let mut mat: Option<(u32, u32)> = None;
    let mut conversions = vec![None; args.len()];
    let mut out_args = Vec::new();

    // A float shape, possibly after converting an int shape
    let float_shape = |arg: &TypeLayout, allow: bool| -> Option<(TypeLayout, bool)> {
        match *arg {
            TypeLayout::Scalar(ScalarType::Float) | TypeLayout::Vector(ScalarType::Float, _) => {
                Some((arg.clone(), false))
            }
            TypeLayout::Scalar(ScalarType::Int) | TypeLayout::Scalar(ScalarType::UInt) if allow => {
                Some((TypeLayout::Scalar(ScalarType::Float), true))
            }
            TypeLayout::Vector(ScalarType::Int, n) | TypeLayout::Vector(ScalarType::UInt, n)
                if allow =>
            {
                Some((TypeLayout::Vector(ScalarType::Float, n), true))
            }
            _ => None,
        }
    };

    for (i, (pattern, arg)) in params.iter().zip(args.iter()).enumerate() {
        match *pattern {
            ParamType::Gen | ParamType::OutGen => {
                let allow = allow_conversion && *pattern == ParamType::Gen;
                let (shape, converted) = float_shape(arg, allow)?;
                if !unify(&mut gen, shape.clone()) {
                    return None;
                }
                if converted {
                    conversions[i] = Some(shape);
                }
                if *pattern == ParamType::OutGen {
                    out_args.push(i);
                }
            }
            ParamType::GenScalar => {
                let (shape, converted) = float_shape(arg, allow_conversion)?;
                if shape != TypeLayout::Scalar(ScalarType::Float) {
                    return None;
                }
                if converted {
                    conversions[i] = Some(shape);
                }
            }
            ParamType::GenInt => match *arg {
                TypeLayout::Scalar(ScalarType::Int) | TypeLayout::Vector(ScalarType::Int, _) => {
                    if !unify(&mut gen, arg.clone()) {
                        return None;
                    }
                }
                _ => return None,
            },
            ParamType::GenIntScalar => {
                if *arg != TypeLayout::Scalar(ScalarType::Int) {
                    return None;
                }
            }
            ParamType::GenUInt => match *arg {
                TypeLayout::Scalar(ScalarType::UInt) | TypeLayout::Vector(ScalarType::UInt, _) => {
                    if !unify(&mut gen, arg.clone()) {
                        return None;
                    }
                }
                _ => return None,
            },
            ParamType::GenUIntScalar => {
                if *arg != TypeLayout::Scalar(ScalarType::UInt) {
                    return None;
                }
            }
            ParamType::GenBool => match *arg {
                TypeLayout::Scalar(ScalarType::Bool) | TypeLayout::Vector(ScalarType::Bool, _) => {
                    let arg_dim = dim(arg).unwrap_or(0);
                    match gen.as_ref().and_then(dim) {
                        Some(gen_dim) if gen_dim != arg_dim => return None,
                        _ => {}
                    }
                }
                _ => return None,
            },
            ParamType::Vec => match *arg {
                TypeLayout::Vector(ScalarType::Float, n) => {
                    if !unify(&mut vec_size, n) {
                        return None;
                    }
                }
                _ => return None,
            },
            ParamType::IntVec => match *arg {
                TypeLayout::Vector(ScalarType::Int, n) => {
                    if !unify(&mut vec_size, n) {
                        return None;
                    }
                }
                _ => return None,
            },
            ParamType::UIntVec => match *arg {
                TypeLayout::Vector(ScalarType::UInt, n) => {
                    if !unify(&mut vec_size, n) {
                        return None;
                    }
                }
                _ => return None,
            },
            ParamType::BoolVec => match *arg {
                TypeLayout::Vector(ScalarType::Bool, n) => {
                    if !unify(&mut vec_size, n) {
                        return None;
                    }
                }
                _ => return None,
            },
            ParamType::Float => {
                let (shape, converted) = float_shape(arg, allow_conversion)?;
                if shape != TypeLayout::Scalar(ScalarType::Float) {
                    return None;
                }
                if converted {
                    conversions[i] = Some(shape);
                }
            }
            ParamType::Vec2 | ParamType::Vec3 | ParamType::Vec4 => {
                let wanted = match *pattern {
                    ParamType::Vec2 => 2,
                    ParamType::Vec3 => 3,
                    _ => 4,
                };
                let (shape, converted) = float_shape(arg, allow_conversion)?;
                if shape != TypeLayout::Vector(ScalarType::Float, wanted) {
                    return None;
                }
                if converted {
                    conversions[i] = Some(shape);
                }
            }
            ParamType::Mat => match *arg {
                TypeLayout::Matrix(c, r) => {
                    if !unify(&mut mat, (c, r)) {
                        return None;
                    }
                }
                _ => return None,
            },
            ParamType::Sampler(wanted) => {
                if *arg != TypeLayout::Sampler(wanted) {
                    return None;
                }
            }
        }
    }

    let return_layout = match returns {
        ReturnType::Gen => gen?,
        ReturnType::BoolVec => TypeLayout::Vector(ScalarType::Bool, vec_size?),
        ReturnType::Float => TypeLayout::Scalar(ScalarType::Float),
        ReturnType::Bool => TypeLayout::Scalar(ScalarType::Bool),
        ReturnType::UInt => TypeLayout::Scalar(ScalarType::UInt),
        ReturnType::Vec2 => TypeLayout::Vector(ScalarType::Float, 2),
        ReturnType::Vec3 => TypeLayout::Vector(ScalarType::Float, 3),
        ReturnType::Vec4 => TypeLayout::Vector(ScalarType::Float, 4),
        ReturnType::Mat => {
            let (c, r) = mat?;
            TypeLayout::Matrix(c, r)
        }
    };
    Some(IntrinsicMatch {
        intrinsic,
        return_layout,
        conversions,
        out_args,
    })
}

/// Resolves a builtin call: exact matches win over matches that need an
/// implicit int-to-float conversion.
pub fn resolve(
    name: &str,
    args: &[TypeLayout],
    version: ShaderVersion,
    stage: ShaderStage,
) -> Option<IntrinsicMatch> {
    for allow_conversion in [false, true] {
        for def in intrinsics::candidates(name, version, stage) {
            if let Some(found) =
                match_signature(def.params, def.returns, def.intrinsic, args, allow_conversion)
            {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec(n: u32) -> TypeLayout {
        TypeLayout::Vector(ScalarType::Float, n)
    }

    fn float() -> TypeLayout {
        TypeLayout::Scalar(ScalarType::Float)
    }

    #[test]
    fn gen_unifies() {
        let m = resolve(
            "dot",
            &[vec(3), vec(3)],
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        )
        .unwrap();
        assert_eq!(m.return_layout, float());

        assert!(resolve(
            "dot",
            &[vec(3), vec(2)],
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        )
        .is_none());
    }

    #[test]
    fn int_argument_converts() {
        let m = resolve(
            "dot",
            &[float(), TypeLayout::Scalar(ScalarType::Int)],
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        )
        .unwrap();
        assert_eq!(m.conversions[0], None);
        assert_eq!(m.conversions[1], Some(float()));
    }

    #[test]
    fn scalar_overload_beats_conversion() {
        // clamp(vec3, float, float) must pick the scalar min/max overload
        let m = resolve(
            "clamp",
            &[vec(3), float(), float()],
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        )
        .unwrap();
        assert_eq!(m.return_layout, vec(3));
    }

    #[test]
    fn bool_selector_mix_is_essl3_only() {
        let args = [vec(3), vec(3), TypeLayout::Vector(ScalarType::Bool, 3)];
        assert!(resolve("mix", &args, ShaderVersion::Essl100, ShaderStage::Fragment).is_none());
        let m = resolve("mix", &args, ShaderVersion::Essl300, ShaderStage::Fragment).unwrap();
        assert_eq!(m.return_layout, vec(3));
    }

    #[test]
    fn relational_returns_bool_vector() {
        let m = resolve(
            "lessThan",
            &[vec(4), vec(4)],
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        )
        .unwrap();
        assert_eq!(m.return_layout, TypeLayout::Vector(ScalarType::Bool, 4));
    }

    #[test]
    fn texture_requires_exact_sampler() {
        use esslt_lang_hir::SamplerType;
        assert!(resolve(
            "texture2D",
            &[TypeLayout::Sampler(SamplerType::SamplerCube), vec(2)],
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        )
        .is_none());
    }
}
