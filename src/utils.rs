use std::error::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// Takes a list where each element is a set of alternatives, and returns every way of
/// picking one alternative from each set. Will clone the elements.
///
/// ```
/// let v = vec![
///   vec!["dog"],
///   vec!["with-a", "with-b"],
///   vec!["bone", "ball", "stick"],
/// ];
///
/// assert_eq!(tigparse::utils::combinations(&v), vec![
///   vec!["dog", "with-a", "bone"],
///   vec!["dog", "with-b", "bone"],
///   vec!["dog", "with-a", "ball"],
///   vec!["dog", "with-b", "ball"],
///   vec!["dog", "with-a", "stick"],
///   vec!["dog", "with-b", "stick"],
/// ]);
/// ```
///
/// A set with no alternatives means there is no way to pick, so the result is empty.
pub fn combinations<T>(list: &[Vec<T>]) -> Vec<Vec<T>>
where
  T: Clone,
{
  match list {
    [] => Vec::new(),
    [only] => only.iter().map(|e| vec![e.clone()]).collect(),
    [head, tail @ ..] => combinations(tail)
      .into_iter()
      .flat_map(|subseq| {
        // prepend every element of the head to every possible subseq
        head.iter().map(move |v| {
          let mut newseq = Vec::with_capacity(subseq.len() + 1);
          newseq.push(v.clone());
          newseq.extend(subseq.iter().cloned());
          newseq
        })
      })
      .collect(),
  }
}
